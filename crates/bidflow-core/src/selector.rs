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

//! Forecast selection across prioritized providers with snapshot fallback.

use chrono::NaiveDate;
use tracing::{info, warn};

use bidflow_shared::{Direction, ForecastRow, ForecastSource, NormalizedForecastRow};

use crate::error::{BidError, Result};
use crate::normalizer::normalize;
use crate::snapshot::SnapshotStore;
use crate::traits::{ALERT_CHANNEL, ForecastStore, LOG_CHANNEL, Notifier};

/// Where a loaded forecast came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForecastOrigin {
    Store(ForecastSource),
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct LoadedForecast {
    pub origin: ForecastOrigin,
    pub rows: Vec<NormalizedForecastRow>,
}

/// Returns the rows of the first source with any data for `target_date`.
///
/// Sources are tried strictly in the given order; a later source is never
/// consulted once an earlier one produced rows.
pub fn select_forecast(
    store: &dyn ForecastStore,
    sources: &[ForecastSource],
    metering_point_prefix: &str,
    target_date: NaiveDate,
) -> Result<(ForecastSource, Vec<ForecastRow>)> {
    for source in sources {
        let rows = store.forecast_rows(source, metering_point_prefix, target_date)?;
        if rows.is_empty() {
            info!(source = %source.name, id = source.id, "Forecast source has no data");
            continue;
        }
        info!(source = %source.name, id = source.id, rows = rows.len(), "Forecast source selected");
        return Ok((source.clone(), rows));
    }

    Err(BidError::NoForecast {
        metering_point_prefix: metering_point_prefix.to_owned(),
        target_date,
    })
}

/// Loads the normalized forecast of one direction.
///
/// Store failures fall back to the snapshot of the previous successful load;
/// an empty store is fatal and never falls back.
#[derive(Debug)]
pub struct ForecastLoader<'a> {
    snapshot: &'a SnapshotStore,
}

impl<'a> ForecastLoader<'a> {
    pub fn new(snapshot: &'a SnapshotStore) -> Self {
        Self { snapshot }
    }

    /// `store` is `None` when the store could not be opened at all.
    pub fn load(
        &self,
        store: Option<&dyn ForecastStore>,
        sources: &[ForecastSource],
        direction: Direction,
        target_date: NaiveDate,
        notifier: &dyn Notifier,
    ) -> Result<LoadedForecast> {
        if let Some(store) = store {
            match Self::load_from_store(store, sources, direction, target_date) {
                Ok(loaded) => {
                    if let Err(e) = self.snapshot.save(direction, &loaded.rows) {
                        warn!(%direction, error = %e, "Failed to save forecast snapshot");
                        notifier.notify(
                            ALERT_CHANNEL,
                            &format!("{direction} forecast snapshot not saved: {e}"),
                        );
                    }
                    if let ForecastOrigin::Store(source) = &loaded.origin {
                        notifier.notify(
                            LOG_CHANNEL,
                            &format!(
                                "{direction} forecast for {target_date}: source {} ({} rows)",
                                source.name,
                                loaded.rows.len()
                            ),
                        );
                    }
                    return Ok(loaded);
                }
                Err(e) if e.is_store_failure() => {
                    warn!(%direction, error = %e, "Forecast store failed, using snapshot");
                }
                Err(e) => return Err(e),
            }
        } else {
            warn!(%direction, "Forecast store unreachable, using snapshot");
        }

        let rows = self.snapshot.load(direction)?;
        if rows.iter().any(|row| row.timestamp.date() != target_date) {
            warn!(
                %direction,
                %target_date,
                "Snapshot contains rows for a different date"
            );
        }
        notifier.notify(
            LOG_CHANNEL,
            &format!(
                "{direction} forecast for {target_date}: store unavailable, loaded snapshot ({} rows)",
                rows.len()
            ),
        );

        Ok(LoadedForecast {
            origin: ForecastOrigin::Snapshot,
            rows,
        })
    }

    fn load_from_store(
        store: &dyn ForecastStore,
        sources: &[ForecastSource],
        direction: Direction,
        target_date: NaiveDate,
    ) -> Result<LoadedForecast> {
        let (source, rows) =
            select_forecast(store, sources, direction.metering_point_prefix(), target_date)?;
        let reference = store.metering_points()?;
        let rows = normalize(rows, &reference, direction)?;
        Ok(LoadedForecast {
            origin: ForecastOrigin::Store(source),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use bidflow_shared::MeteringPointRef;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeStore {
        rows: HashMap<i64, Vec<ForecastRow>>,
        reference: Vec<MeteringPointRef>,
        unavailable: bool,
        queried: RefCell<Vec<i64>>,
    }

    impl ForecastStore for FakeStore {
        fn forecast_rows(
            &self,
            source: &ForecastSource,
            _metering_point_prefix: &str,
            _target_date: NaiveDate,
        ) -> Result<Vec<ForecastRow>> {
            if self.unavailable {
                return Err(BidError::StoreUnavailable("connection refused".to_owned()));
            }
            self.queried.borrow_mut().push(source.id);
            Ok(self.rows.get(&source.id).cloned().unwrap_or_default())
        }

        fn metering_points(&self) -> Result<Vec<MeteringPointRef>> {
            Ok(self.reference.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: RefCell<Vec<(usize, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, channel: usize, text: &str) {
            self.messages.borrow_mut().push((channel, text.to_owned()));
        }
    }

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
    }

    fn source(name: &str, id: i64) -> ForecastSource {
        ForecastSource {
            name: name.to_owned(),
            id,
        }
    }

    fn forecast(metering_point: &str, hour: u32, kw: f64) -> ForecastRow {
        ForecastRow {
            metering_point: metering_point.to_owned(),
            timestamp: target().and_hms_opt(hour, 0, 0).unwrap(),
            value: kw,
            load_time: target().pred_opt().unwrap().and_hms_opt(10, 0, 0).unwrap(),
        }
    }

    fn store_with(rows: Vec<(i64, Vec<ForecastRow>)>) -> FakeStore {
        FakeStore {
            rows: rows.into_iter().collect(),
            reference: vec![MeteringPointRef {
                metering_point: "X".to_owned(),
                company: "C1".to_owned(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_first_non_empty_source_wins() {
        let store = store_with(vec![
            (1, vec![]),
            (2, vec![forecast("X", 0, 100.0)]),
            (3, vec![forecast("X", 0, 100.0), forecast("X", 1, 100.0)]),
        ]);
        let sources = [source("A", 1), source("B", 2), source("C", 3)];

        let (selected, rows) = select_forecast(&store, &sources, "GVIE", target()).unwrap();

        assert_eq!(selected.name, "B");
        assert_eq!(rows.len(), 1);
        assert_eq!(*store.queried.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_all_sources_empty_is_fatal() {
        let store = store_with(vec![]);
        let sources = [source("A", 1), source("B", 2)];

        let err = select_forecast(&store, &sources, "GVIE", target()).unwrap_err();
        assert!(matches!(err, BidError::NoForecast { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_normalizes_and_saves_snapshot() {
        let dir = tempdir().unwrap();
        let snapshot = SnapshotStore::new(dir.path());
        let store = store_with(vec![(1, vec![]), (2, vec![forecast("X", 7, 500.0)])]);
        let notifier = RecordingNotifier::default();

        let loaded = ForecastLoader::new(&snapshot)
            .load(
                Some(&store),
                &[source("A", 1), source("B", 2)],
                Direction::Generation,
                target(),
                &notifier,
            )
            .unwrap();

        assert_eq!(loaded.origin, ForecastOrigin::Store(source("B", 2)));
        assert_eq!(loaded.rows[0].company, "C1");
        assert_eq!(loaded.rows[0].hour, 7);
        assert!((loaded.rows[0].value_mwh - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.load(Direction::Generation).unwrap(), loaded.rows);
        assert_eq!(notifier.messages.borrow().len(), 1);
    }

    #[test]
    fn test_snapshot_write_failure_keeps_fresh_forecast() {
        let dir = tempdir().unwrap();
        // A file where the snapshot directory should be makes every save fail.
        let blocked = dir.path().join("data");
        std::fs::write(&blocked, b"not a directory").unwrap();
        let snapshot = SnapshotStore::new(&blocked);
        let store = store_with(vec![(1, vec![forecast("X", 5, 1200.0)])]);
        let notifier = RecordingNotifier::default();

        let loaded = ForecastLoader::new(&snapshot)
            .load(Some(&store), &[source("A", 1)], Direction::Generation, target(), &notifier)
            .unwrap();

        assert_eq!(loaded.origin, ForecastOrigin::Store(source("A", 1)));
        assert_eq!(loaded.rows.len(), 1);
        let messages = notifier.messages.borrow();
        assert!(
            messages
                .iter()
                .any(|(channel, text)| *channel == ALERT_CHANNEL && text.contains("snapshot"))
        );
    }

    #[test]
    fn test_unreachable_store_falls_back_to_snapshot() {
        let dir = tempdir().unwrap();
        let snapshot = SnapshotStore::new(dir.path());
        let healthy = store_with(vec![(1, vec![forecast("X", 3, 2000.0)])]);
        let notifier = RecordingNotifier::default();
        let loader = ForecastLoader::new(&snapshot);
        let sources = [source("A", 1)];

        let first = loader
            .load(Some(&healthy), &sources, Direction::Generation, target(), &notifier)
            .unwrap();

        let broken = FakeStore {
            unavailable: true,
            ..Default::default()
        };
        let second = loader
            .load(Some(&broken), &sources, Direction::Generation, target(), &notifier)
            .unwrap();
        assert_eq!(second.origin, ForecastOrigin::Snapshot);
        assert_eq!(second.rows, first.rows);

        let third = loader
            .load(None, &sources, Direction::Generation, target(), &notifier)
            .unwrap();
        assert_eq!(third.rows, first.rows);
    }

    #[test]
    fn test_unreachable_store_without_snapshot_is_fatal() {
        let dir = tempdir().unwrap();
        let snapshot = SnapshotStore::new(dir.path());
        let notifier = RecordingNotifier::default();

        let err = ForecastLoader::new(&snapshot)
            .load(None, &[source("A", 1)], Direction::Generation, target(), &notifier)
            .unwrap_err();
        assert!(matches!(err, BidError::SnapshotMissing { .. }));
    }

    #[test]
    fn test_empty_store_does_not_fall_back() {
        let dir = tempdir().unwrap();
        let snapshot = SnapshotStore::new(dir.path());
        let notifier = RecordingNotifier::default();
        let loader = ForecastLoader::new(&snapshot);
        let sources = [source("A", 1)];

        loader
            .load(
                Some(&store_with(vec![(1, vec![forecast("X", 0, 1.0)])])),
                &sources,
                Direction::Generation,
                target(),
                &notifier,
            )
            .unwrap();

        let err = loader
            .load(Some(&store_with(vec![])), &sources, Direction::Generation, target(), &notifier)
            .unwrap_err();
        assert!(matches!(err, BidError::NoForecast { .. }));
    }
}
