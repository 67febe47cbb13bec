// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of BidFlow.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Trading direction of a bid.
///
/// Generation is offered to the market (`ask`), consumption is bought from
/// it (`bid`). The direction decides the metering point type, the document
/// file prefix and whether modification consent is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Generation,
    Consumption,
}

impl Direction {
    /// Wire value of the `direction` attribute.
    #[must_use]
    pub const fn wire_value(self) -> &'static str {
        match self {
            Self::Generation => "ask",
            Self::Consumption => "bid",
        }
    }

    /// Prefix of the bid document file name.
    #[must_use]
    pub const fn file_prefix(self) -> &'static str {
        match self {
            Self::Generation => "ASP",
            Self::Consumption => "BSP",
        }
    }

    /// Metering point type prefix used to scope forecast queries.
    #[must_use]
    pub const fn metering_point_prefix(self) -> &'static str {
        match self {
            Self::Generation => "GVIE",
            Self::Consumption => "PVIE",
        }
    }

    /// Leading letter substitution applied to reference codes before the join.
    ///
    /// The reference table lists generation codes only; consumption points
    /// share the code body with a `P` in place of the leading `G`.
    #[must_use]
    pub const fn reference_letter_swap(self) -> Option<(char, char)> {
        match self {
            Self::Generation => None,
            Self::Consumption => Some(('G', 'P')),
        }
    }

    /// Whether documents of this direction declare modification consent.
    #[must_use]
    pub const fn declares_modification_consent(self) -> bool {
        matches!(self, Self::Generation)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Consumption => write!(f, "consumption"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generation" | "ask" => Ok(Self::Generation),
            "consumption" | "bid" => Ok(Self::Consumption),
            other => Err(format!("Unknown direction: {other}")),
        }
    }
}

/// A named forecast provider with its numeric id in the forecast table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSource {
    pub name: String,
    pub id: i64,
}

/// Raw hourly forecast as stored by the forecast providers (kW).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub metering_point: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub load_time: NaiveDateTime,
}

/// Reference table entry mapping a metering point to its owning company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteringPointRef {
    pub metering_point: String,
    pub company: String,
}

/// Forecast row joined with its company and rescaled to MWh.
///
/// This is also the record layout of the forecast snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedForecastRow {
    pub metering_point: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub load_time: NaiveDateTime,
    pub company: String,
    pub hour: u32,
    pub value_mwh: f64,
}
