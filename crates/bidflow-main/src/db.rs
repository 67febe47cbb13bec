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

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags, params};
use tracing::debug;

use bidflow_core::{BidError, ForecastStore, Result};
use bidflow_shared::{ForecastRow, ForecastSource, MeteringPointRef};

use crate::config::DatabaseSettings;

/// Tables read by [`SqliteStore`]. Timestamps are `YYYY-MM-DD HH:MM:SS` text.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS weather_foreca (
        gtp        TEXT NOT NULL,
        dt         TEXT NOT NULL,
        load_time  TEXT NOT NULL,
        value      REAL NOT NULL,
        id_foreca  INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_weather_foreca_source_dt
        ON weather_foreca(id_foreca, dt);

    CREATE TABLE IF NOT EXISTS ses_gtp (
        gtp      TEXT PRIMARY KEY,
        company  TEXT NOT NULL
    );";

const FORECAST_QUERY: &str = "
    SELECT gtp, dt, load_time, value
    FROM weather_foreca
    WHERE id_foreca = ?1
      AND gtp LIKE ?2 || '%'
      AND CAST(strftime('%H', load_time) AS INTEGER) < 15
      AND date(load_time) = date(dt, '-1 day')
      AND date(dt) = ?3
    ORDER BY gtp, dt";

const REFERENCE_QUERY: &str = "SELECT gtp, company FROM ses_gtp";

/// Forecast store backed by SQLite.
///
/// Forecasts and the reference table may live in separate databases.
#[derive(Debug)]
pub struct SqliteStore {
    forecast: Connection,
    reference: Connection,
}

impl SqliteStore {
    /// Opens existing databases. A missing file means the store is unreachable.
    pub fn open(settings: &DatabaseSettings) -> Result<Self> {
        Ok(Self {
            forecast: open_existing(&settings.forecast_path)?,
            reference: open_existing(settings.reference_path())?,
        })
    }

    #[must_use]
    pub fn from_connections(forecast: Connection, reference: Connection) -> Self {
        Self {
            forecast,
            reference,
        }
    }

    /// Creates the tables when they are missing.
    pub fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA).map_err(store_error)
    }
}

fn open_existing(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| BidError::StoreUnavailable(format!("{}: {e}", path.display())))
}

fn store_error(e: rusqlite::Error) -> BidError {
    BidError::Store(e.to_string())
}

impl ForecastStore for SqliteStore {
    fn forecast_rows(
        &self,
        source: &ForecastSource,
        metering_point_prefix: &str,
        target_date: NaiveDate,
    ) -> Result<Vec<ForecastRow>> {
        let mut stmt = self.forecast.prepare(FORECAST_QUERY).map_err(store_error)?;
        let rows = stmt
            .query_map(
                params![
                    source.id,
                    metering_point_prefix,
                    target_date.format("%Y-%m-%d").to_string()
                ],
                |row| {
                    Ok(ForecastRow {
                        metering_point: row.get(0)?,
                        timestamp: row.get(1)?,
                        load_time: row.get(2)?,
                        value: row.get(3)?,
                    })
                },
            )
            .map_err(store_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_error)?;

        debug!(source = %source.name, prefix = metering_point_prefix, rows = rows.len(), "Forecast queried");
        Ok(rows)
    }

    fn metering_points(&self) -> Result<Vec<MeteringPointRef>> {
        let mut stmt = self.reference.prepare(REFERENCE_QUERY).map_err(store_error)?;
        stmt.query_map([], |row| {
            Ok(MeteringPointRef {
                metering_point: row.get(0)?,
                company: row.get(1)?,
            })
        })
        .map_err(store_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_error)
    }
}
