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

//! Capabilities the pipeline needs from the outside world.
//!
//! Each trait has one production adapter in `bidflow-main` and in-memory
//! fakes in the tests.

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use bidflow_shared::{ForecastRow, ForecastSource, MeteringPointRef, MonitoringReportRow};

use crate::error::Result;

/// Notification channel for failures that need operator attention.
pub const ALERT_CHANNEL: usize = 0;
/// Notification channel mirroring pipeline progress.
pub const LOG_CHANNEL: usize = 1;

/// Relational store holding provider forecasts and the metering point reference table.
pub trait ForecastStore {
    /// Rows of one source for one metering point type, loaded before 15:00
    /// on the day before `target_date`, ordered by metering point and timestamp.
    fn forecast_rows(
        &self,
        source: &ForecastSource,
        metering_point_prefix: &str,
        target_date: NaiveDate,
    ) -> Result<Vec<ForecastRow>>;

    /// The full metering point to company reference table.
    fn metering_points(&self) -> Result<Vec<MeteringPointRef>>;
}

/// Best-effort outbound notifications. Delivery failures never reach the caller.
pub trait Notifier {
    fn notify(&self, channel: usize, text: &str);
}

/// Notifier that only writes to the log. Used when no channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, channel: usize, text: &str) {
        info!(channel, "{text}");
    }
}

/// Signing certificate of a company.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub serial: String,
    pub subject: String,
    pub thumbprint: String,
    /// PEM bundle (certificate and private key) for TLS client authentication.
    pub identity_pem: Option<Vec<u8>>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("serial", &self.serial)
            .field("subject", &self.subject)
            .field("thumbprint", &self.thumbprint)
            .field("identity_pem", &self.identity_pem.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait CertificateStore {
    fn find_certificate(&self, serial: &str) -> Option<Certificate>;
}

/// Starts the external program that submits the written documents.
pub trait ExternalSender {
    /// Launches `script` inside `work_dir` without waiting for it to finish.
    fn launch(&self, script: &Path, work_dir: &Path) -> Result<()>;
}

/// Source of the operator's bid monitoring report.
pub trait ReportSource {
    fn fetch_report(
        &self,
        company: &str,
        date: NaiveDate,
        certificate: &Certificate,
    ) -> Result<Vec<MonitoringReportRow>>;
}
