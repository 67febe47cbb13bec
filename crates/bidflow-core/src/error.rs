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

//! Error types for the bid pipeline

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BidError {
    #[error("forecast store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("forecast store query failed: {0}")]
    Store(String),

    #[error("no {metering_point_prefix} forecast for {target_date} from any source")]
    NoForecast {
        metering_point_prefix: String,
        target_date: NaiveDate,
    },

    #[error("forecast store unreachable and no snapshot at {}", path.display())]
    SnapshotMissing { path: PathBuf },

    #[error("metering points without a company in the reference table: {}", .0.join(", "))]
    UnmatchedMeteringPoints(Vec<String>),

    #[error("hourly values for {metering_point} are invalid: {reason}")]
    InvalidHourlyValues {
        metering_point: String,
        reason: String,
    },

    #[error("bid document already exists: {}", .0.display())]
    DocumentExists(PathBuf),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("report header {0:?} not found")]
    ReportHeaderNotFound(String),

    #[error("report parse error: {0}")]
    Report(String),

    #[error("request to {url} failed after {attempts} attempts: {reason}")]
    Request {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("certificate {serial} for company {company} not found")]
    CertificateNotFound { company: String, serial: String },

    #[error("no settings configured for company {0}")]
    UnknownCompany(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
}

impl BidError {
    /// Store failures trigger the snapshot fallback instead of aborting.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Store(_))
    }

    /// Errors that end the whole run rather than one company or document.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoForecast { .. } | Self::SnapshotMissing { .. } | Self::UnmatchedMeteringPoints(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BidError>;
