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

//! Bid monitoring report parsing and reconciliation against the forecast.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDate;
use tracing::{info, warn};

use bidflow_shared::{MonitoringReportRow, NormalizedForecastRow, ReconciliationRecord};

use crate::error::{BidError, Result};

/// First-column text of the report's table header row.
pub const REPORT_HEADER_MARKER: &str = "Код ГТП";

/// Volume difference (MWh) tolerated before a row counts as a discrepancy.
pub const DISCREPANCY_TOLERANCE_MWH: f64 = 0.001;

/// Reads the first sheet of an xls/xlsx workbook as rows of cell text.
pub fn read_report_table(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BidError::Report("workbook has no sheets".to_owned()))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Rows following the first row whose first cell equals `marker`.
pub fn extract_report_rows(table: &[Vec<String>], marker: &str) -> Result<Vec<MonitoringReportRow>> {
    let header = table
        .iter()
        .position(|row| row.first().is_some_and(|cell| cell.trim() == marker))
        .ok_or_else(|| BidError::ReportHeaderNotFound(marker.to_owned()))?;

    Ok(table[header + 1..].iter().map(|row| report_row(row)).collect())
}

fn report_row(cells: &[String]) -> MonitoringReportRow {
    let cell = |index: usize| cells.get(index).map(|c| c.trim().to_owned()).unwrap_or_default();
    MonitoringReportRow {
        metering_point: cell(0),
        metering_point_name: cell(1),
        operational_date: cell(2),
        bid_status: cell(3),
        metering_point_status: cell(4),
        bid_number: cell(5),
        total_volume_mwh: parse_volume(&cell(6)),
    }
}

/// Accepts both `.` and `,` as decimal separator. Blank or garbage is `None`.
#[must_use]
pub fn parse_volume(text: &str) -> Option<f64> {
    let normalized: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return None;
    }
    normalized.parse().ok()
}

/// Parses the downloaded report workbook into report rows.
pub fn parse_report(bytes: &[u8], marker: &str) -> Result<Vec<MonitoringReportRow>> {
    let table = read_report_table(bytes)?;
    extract_report_rows(&table, marker)
}

/// Left-joins the company's forecast totals onto the report rows.
///
/// Every report row yields exactly one record; a metering point absent from
/// the forecast gets `None`, never zero.
#[must_use]
pub fn reconcile(
    report_rows: &[MonitoringReportRow],
    forecast: &[NormalizedForecastRow],
    company: &str,
) -> Vec<ReconciliationRecord> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for row in forecast.iter().filter(|row| row.company == company) {
        *totals.entry(row.metering_point.as_str()).or_default() += row.value_mwh;
    }

    report_rows
        .iter()
        .map(|report| ReconciliationRecord {
            forecast_total_volume: totals.get(report.metering_point.as_str()).copied(),
            report: report.clone(),
        })
        .collect()
}

/// Logs every discrepancy and returns how many there are.
pub fn count_discrepancies(company: &str, records: &[ReconciliationRecord]) -> usize {
    let mut count = 0;
    for record in records
        .iter()
        .filter(|record| record.is_discrepancy(DISCREPANCY_TOLERANCE_MWH))
    {
        count += 1;
        warn!(
            company,
            metering_point = %record.report.metering_point,
            reported = ?record.report.total_volume_mwh,
            forecast = ?record.forecast_total_volume,
            "Submitted volume differs from forecast"
        );
    }
    count
}

/// Artifact path: `{dir}/{report_type}_{company}_{dd.mm.yyyy}.csv`.
#[must_use]
pub fn reconciliation_path(dir: &Path, report_type: &str, company: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{report_type}_{company}_{}.csv", date.format("%d.%m.%Y")))
}

/// Writes the reconciliation artifact, replacing any earlier one.
pub fn write_reconciliation(path: &Path, records: &[ReconciliationRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(ReconciliationRecord::COLUMNS)?;
    for record in records {
        writer.write_record(record.to_cells())?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = records.len(), "Reconciliation written");
    Ok(())
}
