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

//! Forecast normalization: company join, kW to MWh rescale and grouping helpers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Timelike;
use tracing::warn;

use bidflow_shared::{Direction, ForecastRow, MeteringPointRef, NormalizedForecastRow};

use crate::error::{BidError, Result};

/// Volume submitted in place of a zero forecast.
///
/// The platform rejects zero volumes, so every hour carries at least this.
pub const ZERO_VOLUME_SUBSTITUTE: f64 = 0.1;

/// Replaces an exact zero volume with [`ZERO_VOLUME_SUBSTITUTE`].
#[must_use]
pub fn apply_zero_volume_policy(mwh: f64) -> f64 {
    if mwh == 0.0 { ZERO_VOLUME_SUBSTITUTE } else { mwh }
}

/// kW to MWh, rounded to two decimals, zero policy applied.
#[must_use]
pub fn kw_to_mwh(kw: f64) -> f64 {
    apply_zero_volume_policy((kw / 1000.0 * 100.0).round() / 100.0)
}

/// Joins forecast rows with their companies and rescales them.
///
/// Every row must find its company; otherwise all unmatched metering points
/// are reported in a single error.
pub fn normalize(
    rows: Vec<ForecastRow>,
    reference: &[MeteringPointRef],
    direction: Direction,
) -> Result<Vec<NormalizedForecastRow>> {
    let owners = reference_index(reference, direction);
    let mut unmatched = BTreeSet::new();
    let mut normalized = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(company) = owners.get(row.metering_point.as_str()) else {
            unmatched.insert(row.metering_point);
            continue;
        };
        normalized.push(NormalizedForecastRow {
            hour: row.timestamp.hour(),
            value_mwh: kw_to_mwh(row.value),
            company: (*company).to_owned(),
            metering_point: row.metering_point,
            timestamp: row.timestamp,
            value: row.value,
            load_time: row.load_time,
        });
    }

    if !unmatched.is_empty() {
        return Err(BidError::UnmatchedMeteringPoints(unmatched.into_iter().collect()));
    }
    Ok(normalized)
}

fn reference_index(reference: &[MeteringPointRef], direction: Direction) -> HashMap<String, &str> {
    let mut index = HashMap::with_capacity(reference.len());
    for entry in reference {
        let code = reference_code(&entry.metering_point, direction);
        if let Some(previous) = index.get(&code) {
            if *previous != entry.company.as_str() {
                warn!(
                    metering_point = %code,
                    kept = %previous,
                    ignored = %entry.company,
                    "Duplicate metering point in reference table"
                );
            }
            continue;
        }
        index.insert(code, entry.company.as_str());
    }
    index
}

fn reference_code(code: &str, direction: Direction) -> String {
    direction
        .reference_letter_swap()
        .and_then(|(from, to)| code.strip_prefix(from).map(|rest| format!("{to}{rest}")))
        .unwrap_or_else(|| code.to_owned())
}

/// Companies in order of first appearance.
#[must_use]
pub fn companies(rows: &[NormalizedForecastRow]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.company.as_str()))
        .map(|row| row.company.clone())
        .collect()
}

/// Metering points of one company in order of first appearance.
#[must_use]
pub fn metering_points_of(rows: &[NormalizedForecastRow], company: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    rows.iter()
        .filter(|row| row.company == company && seen.insert(row.metering_point.as_str()))
        .map(|row| row.metering_point.clone())
        .collect()
}

/// Hour to MWh map of one metering point. A repeated hour keeps the last value.
#[must_use]
pub fn hourly_values(rows: &[NormalizedForecastRow], metering_point: &str) -> BTreeMap<u32, f64> {
    rows.iter()
        .filter(|row| row.metering_point == metering_point)
        .map(|row| (row.hour, row.value_mwh))
        .collect()
}
