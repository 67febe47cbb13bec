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

use serde::{Deserialize, Serialize};

/// One metering point line of the operator's bid monitoring report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitoringReportRow {
    pub metering_point: String,
    pub metering_point_name: String,
    pub operational_date: String,
    pub bid_status: String,
    pub metering_point_status: String,
    pub bid_number: String,
    pub total_volume_mwh: Option<f64>,
}

/// Report row side by side with the volume we forecast for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub report: MonitoringReportRow,
    /// Sum of forecast `value_mwh`; `None` when nothing was forecast.
    pub forecast_total_volume: Option<f64>,
}

impl ReconciliationRecord {
    /// Column names of the reconciliation artifact, in record order.
    pub const COLUMNS: [&'static str; 8] = [
        "metering_point",
        "metering_point_name",
        "operational_date",
        "bid_status",
        "metering_point_status",
        "bid_number",
        "total_volume_mwh",
        "forecast_total_volume",
    ];

    /// Flattens the record into artifact cells. Missing numbers are empty.
    #[must_use]
    pub fn to_cells(&self) -> Vec<String> {
        let number = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        vec![
            self.report.metering_point.clone(),
            self.report.metering_point_name.clone(),
            self.report.operational_date.clone(),
            self.report.bid_status.clone(),
            self.report.metering_point_status.clone(),
            self.report.bid_number.clone(),
            number(self.report.total_volume_mwh),
            number(self.forecast_total_volume),
        ]
    }

    /// Whether the reported volume disagrees with the forecast.
    ///
    /// A report row without a forecast counterpart is always a discrepancy.
    #[must_use]
    pub fn is_discrepancy(&self, tolerance: f64) -> bool {
        match (self.report.total_volume_mwh, self.forecast_total_volume) {
            (Some(reported), Some(forecast)) => (reported - forecast).abs() > tolerance,
            (None, Some(_)) | (_, None) => true,
        }
    }
}
