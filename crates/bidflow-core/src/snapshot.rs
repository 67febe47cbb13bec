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

//! Forecast snapshot persistence
//!
//! The last forecast loaded from the store is kept on disk so a run can still
//! produce bids when the store is unreachable.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use bidflow_shared::{Direction, NormalizedForecastRow};

use crate::error::{BidError, Result};

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file of one direction.
    #[must_use]
    pub fn path(&self, direction: Direction) -> PathBuf {
        self.dir.join(format!("forecast_{direction}.csv"))
    }

    #[must_use]
    pub fn exists(&self, direction: Direction) -> bool {
        self.path(direction).exists()
    }

    /// Replaces the snapshot of `direction` with `rows`.
    ///
    /// Uses atomic write (temp file + rename) so a crash never leaves a
    /// truncated snapshot behind.
    pub fn save(&self, direction: Direction, rows: &[NormalizedForecastRow]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path(direction);
        let temp_path = path.with_extension("tmp");
        {
            let mut writer = csv::Writer::from_path(&temp_path)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&temp_path, &path)?;

        debug!(path = %path.display(), rows = rows.len(), "Forecast snapshot saved");
        Ok(())
    }

    pub fn load(&self, direction: Direction) -> Result<Vec<NormalizedForecastRow>> {
        let path = self.path(direction);
        if !path.exists() {
            return Err(BidError::SnapshotMissing { path });
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<NormalizedForecastRow>, _>>()?;

        info!(path = %path.display(), rows = rows.len(), "Forecast snapshot loaded");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample_row(hour: u32) -> NormalizedForecastRow {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        NormalizedForecastRow {
            metering_point: "GVIE0101".to_owned(),
            timestamp: day.and_hms_opt(hour, 0, 0).unwrap(),
            value: 1520.0,
            load_time: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(8, 15, 0)
                .unwrap(),
            company: "SOLAR1".to_owned(),
            hour,
            value_mwh: 1.52,
        }
    }

    #[test]
    fn test_load_missing_snapshot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let err = store.load(Direction::Generation).unwrap_err();
        assert!(matches!(err, BidError::SnapshotMissing { .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots"));
        let rows = vec![sample_row(0), sample_row(1)];

        store.save(Direction::Generation, &rows).unwrap();
        assert!(store.exists(Direction::Generation));
        assert!(!store.exists(Direction::Consumption));

        let loaded = store.load(Direction::Generation).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store
            .save(Direction::Generation, &[sample_row(0), sample_row(1), sample_row(2)])
            .unwrap();
        store.save(Direction::Generation, &[sample_row(5)]).unwrap();

        let loaded = store.load(Direction::Generation).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hour, 5);
        assert!(!store.path(Direction::Generation).with_extension("tmp").exists());
    }
}
