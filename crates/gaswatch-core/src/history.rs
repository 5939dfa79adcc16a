// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Daily usage history.
//!
//! Records are keyed by normalised date and never overwritten. Changes are
//! tracked per key so a save only rewrites what the last cycle touched.

use chrono::{NaiveDate, TimeDelta};
use gaswatch_types::{UsageRecord, normalize_date_key, parse_date_key};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::storage::{HistoryStorage, StoredHistory, StoredRecord};

/// Lifecycle of the history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPhase {
    Uninitialized,
    Loaded,
    Stable,
    Recalculating,
}

#[derive(Debug, Clone)]
pub struct History {
    records: BTreeMap<String, StoredRecord>,
    dirty: BTreeSet<String>,
    removed: BTreeSet<String>,
    /// Keys present in the last loaded or saved document
    persisted: BTreeSet<String>,
    phase: HistoryPhase,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
            persisted: BTreeSet::new(),
            phase: HistoryPhase::Uninitialized,
        }
    }

    /// Build from a persisted document.
    ///
    /// Legacy date keys are rewritten to `YYYY-MM-DD` and scheduled for the
    /// next save. Keys that are not dates at all are kept as they are.
    pub fn from_stored(document: &StoredHistory) -> Self {
        let mut history = Self::new();

        for (key, record) in &document.records {
            match normalize_date_key(key) {
                Some(normalized) if normalized == *key => {
                    history.records.entry(normalized).or_insert(*record);
                }
                Some(normalized) => {
                    debug!("Normalising legacy history key {} -> {}", key, normalized);
                    history.removed.insert(key.clone());
                    if !history.records.contains_key(&normalized) {
                        history.records.insert(normalized.clone(), *record);
                        history.dirty.insert(normalized);
                    }
                }
                None => {
                    warn!("History key '{}' is not a date; keeping it untouched", key);
                    history.records.entry(key.clone()).or_insert(*record);
                }
            }
        }

        history.persisted = document.records.keys().cloned().collect();
        history.phase = HistoryPhase::Loaded;
        history
    }

    /// Load through the storage collaborator; an empty store yields an empty
    /// history.
    pub fn load(storage: &dyn HistoryStorage) -> Result<(Self, StoredHistory), StorageError> {
        let document = storage.load()?.unwrap_or_default();
        let history = Self::from_stored(&document);
        info!("📚 [HISTORY] Loaded {} records", history.len());
        Ok((history, document))
    }

    pub fn phase(&self) -> HistoryPhase {
        self.phase
    }

    pub fn begin_recalculation(&mut self) {
        self.phase = HistoryPhase::Recalculating;
    }

    pub fn finish_recalculation(&mut self) {
        self.phase = HistoryPhase::Stable;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&StoredRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Insert records whose date key is not yet present. Returns the number
    /// added; existing days are never overwritten.
    pub fn merge(&mut self, records: &[UsageRecord]) -> usize {
        let mut added = 0;
        for record in records {
            if !record.consumption.is_finite() || record.consumption < 0.0 {
                warn!(
                    "Ignoring invalid consumption {} on {}",
                    record.consumption, record.date
                );
                continue;
            }

            let key = record.date_key();
            if self.records.contains_key(&key) {
                continue;
            }
            self.records.insert(
                key.clone(),
                StoredRecord {
                    usage: record.consumption,
                    avg_temp: record.avg_temp.filter(|t| t.is_finite()),
                },
            );
            self.removed.remove(&key);
            self.dirty.insert(key);
            added += 1;
        }

        if added > 0 {
            debug!("Merged {} new history records", added);
        }
        added
    }

    /// Remove records dated more than `retention_days` before `today`.
    ///
    /// Keys that do not parse as a date are never pruned.
    pub fn prune(&mut self, today: NaiveDate, retention_days: i64) -> usize {
        let Some(cutoff) = TimeDelta::try_days(retention_days)
            .and_then(|window| today.checked_sub_signed(window))
        else {
            return 0;
        };

        let expired: Vec<String> = self
            .records
            .keys()
            .filter(|key| parse_date_key(key).is_some_and(|date| date < cutoff))
            .cloned()
            .collect();

        for key in &expired {
            self.records.remove(key);
            self.dirty.remove(key);
            // A key that never reached storage has nothing to delete
            if self.persisted.contains(key) {
                self.removed.insert(key.clone());
            }
        }

        if !expired.is_empty() {
            debug!(
                "Pruned {} history records older than {}",
                expired.len(),
                cutoff
            );
        }
        expired.len()
    }

    /// `(avg_temp, usage)` pairs fit for regression: positive usage with a
    /// known temperature.
    pub fn usable_points(&self) -> Vec<(f64, f64)> {
        self.records.values().filter_map(usable_point).collect()
    }

    /// Whether the record under `key` would be among [`Self::usable_points`].
    pub fn is_usable(&self, key: &str) -> bool {
        self.records.get(key).and_then(usable_point).is_some()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.dirty.is_empty() || !self.removed.is_empty()
    }

    /// Apply changed and removed keys to `document`. Returns the number of
    /// keys written or deleted; unchanged keys are left alone.
    pub fn write_changes(&self, document: &mut StoredHistory) -> usize {
        for key in &self.removed {
            document.records.remove(key);
        }
        for key in &self.dirty {
            if let Some(record) = self.records.get(key) {
                document.records.insert(key.clone(), *record);
            }
        }
        self.removed.len() + self.dirty.len()
    }

    /// Forget pending changes once they have been persisted.
    pub fn mark_saved(&mut self) {
        for key in std::mem::take(&mut self.removed) {
            self.persisted.remove(&key);
        }
        self.persisted.append(&mut self.dirty);
    }

    /// Full document with every record.
    pub fn to_stored(&self) -> StoredHistory {
        StoredHistory {
            records: self.records.clone(),
            ..StoredHistory::default()
        }
    }
}

fn usable_point(record: &StoredRecord) -> Option<(f64, f64)> {
    let temp = record.avg_temp.filter(|t| t.is_finite())?;
    (record.usage > 0.0 && record.usage.is_finite()).then_some((temp, record.usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(usage: f64, avg_temp: Option<f64>) -> StoredRecord {
        StoredRecord { usage, avg_temp }
    }

    #[test]
    fn test_merge_never_overwrites() {
        let mut history = History::new();
        let first = UsageRecord::new(date(2026, 1, 30), 3.0, Some(40.0));
        let again = UsageRecord::new(date(2026, 1, 30), 9.0, Some(10.0));

        assert_eq!(history.merge(&[first]), 1);
        assert_eq!(history.merge(&[again]), 0);
        assert_eq!(history.get("2026-01-30").unwrap().usage, 3.0);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_merge_rejects_negative_usage() {
        let mut history = History::new();
        let added = history.merge(&[UsageRecord::new(date(2026, 1, 30), -1.0, None)]);
        assert_eq!(added, 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_prune_across_key_formats() {
        let mut document = StoredHistory::default();
        document
            .records
            .insert("2025-09-01".to_owned(), record(1.0, Some(70.0)));
        document
            .records
            .insert("09/02/2025".to_owned(), record(1.0, Some(70.0)));
        document
            .records
            .insert("2026-01-15".to_owned(), record(2.0, Some(30.0)));
        document
            .records
            .insert("01/20/2026".to_owned(), record(2.5, Some(28.0)));
        document
            .records
            .insert("not-a-date".to_owned(), record(1.0, None));

        let mut history = History::from_stored(&document);
        let pruned = history.prune(date(2026, 2, 1), 90);

        assert_eq!(pruned, 2);
        assert!(!history.contains_key("2025-09-01"));
        assert!(!history.contains_key("2025-09-02"));
        assert!(history.contains_key("2026-01-15"));
        assert!(history.contains_key("2026-01-20"));
        assert!(history.contains_key("not-a-date"));
    }

    #[test]
    fn test_prune_boundary_is_inclusive() {
        let mut history = History::new();
        let today = date(2026, 4, 30);
        let on_cutoff = today - TimeDelta::days(90);
        let past_cutoff = on_cutoff - TimeDelta::days(1);
        history.merge(&[
            UsageRecord::new(on_cutoff, 1.0, None),
            UsageRecord::new(past_cutoff, 1.0, None),
        ]);

        assert_eq!(history.prune(today, 90), 1);
        assert!(history.contains_key(&on_cutoff.format("%Y-%m-%d").to_string()));
    }

    #[test]
    fn test_legacy_keys_normalised_on_load() {
        let mut document = StoredHistory::default();
        document
            .records
            .insert("01/15/2026".to_owned(), record(2.0, Some(30.0)));
        document
            .records
            .insert("2026-01-16 00:00:00".to_owned(), record(2.2, Some(31.0)));

        let history = History::from_stored(&document);
        assert_eq!(history.phase(), HistoryPhase::Loaded);
        assert!(history.contains_key("2026-01-15"));
        assert!(history.contains_key("2026-01-16"));
        assert!(history.has_pending_changes());

        let mut saved = document.clone();
        history.write_changes(&mut saved);
        let keys: Vec<&str> = saved.records.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2026-01-15", "2026-01-16"]);
    }

    #[test]
    fn test_write_changes_is_incremental() {
        let mut document = StoredHistory::default();
        document
            .records
            .insert("2026-01-10".to_owned(), record(1.0, Some(50.0)));
        document
            .records
            .insert("2025-06-01".to_owned(), record(0.5, Some(80.0)));

        let mut history = History::from_stored(&document);
        assert!(!history.has_pending_changes());

        history.merge(&[UsageRecord::new(date(2026, 1, 11), 1.5, Some(45.0))]);
        history.prune(date(2026, 2, 1), 90);

        // A value changed behind the history's back is not rewritten
        document.records.get_mut("2026-01-10").unwrap().usage = 99.0;
        let touched = history.write_changes(&mut document);

        assert_eq!(touched, 2);
        assert_eq!(document.records["2026-01-10"].usage, 99.0);
        assert_eq!(document.records["2026-01-11"].usage, 1.5);
        assert!(!document.records.contains_key("2025-06-01"));

        history.mark_saved();
        assert!(!history.has_pending_changes());
    }

    #[test]
    fn test_usable_points_filter() {
        let mut history = History::new();
        history.merge(&[
            UsageRecord::new(date(2026, 1, 1), 2.0, Some(30.0)),
            UsageRecord::new(date(2026, 1, 2), 0.0, Some(31.0)),
            UsageRecord::new(date(2026, 1, 3), 2.0, None),
        ]);
        assert_eq!(history.usable_points(), vec![(30.0, 2.0)]);
    }

    #[test]
    fn test_expired_arrival_leaves_nothing_to_save() {
        let mut history = History::from_stored(&StoredHistory::default());
        history.merge(&[UsageRecord::new(date(2025, 6, 1), 1.0, Some(70.0))]);
        assert!(history.has_pending_changes());

        assert_eq!(history.prune(date(2026, 2, 1), 90), 1);
        assert!(!history.has_pending_changes());
    }

    #[test]
    fn test_saved_key_is_deleted_when_it_expires() {
        let mut history = History::from_stored(&StoredHistory::default());
        history.merge(&[UsageRecord::new(date(2026, 1, 10), 1.0, Some(40.0))]);
        let mut document = StoredHistory::default();
        history.write_changes(&mut document);
        history.mark_saved();
        assert!(!history.has_pending_changes());

        assert_eq!(history.prune(date(2026, 6, 1), 90), 1);
        assert!(history.has_pending_changes());
        history.write_changes(&mut document);
        assert!(document.records.is_empty());
    }

    #[test]
    fn test_is_usable() {
        let mut history = History::new();
        history.merge(&[
            UsageRecord::new(date(2026, 1, 1), 2.0, Some(30.0)),
            UsageRecord::new(date(2026, 1, 2), 2.0, None),
        ]);
        assert!(history.is_usable("2026-01-01"));
        assert!(!history.is_usable("2026-01-02"));
        assert!(!history.is_usable("2026-01-03"));
    }

    #[test]
    fn test_phase_transitions() {
        let mut history = History::from_stored(&StoredHistory::default());
        assert_eq!(history.phase(), HistoryPhase::Loaded);
        history.begin_recalculation();
        assert_eq!(history.phase(), HistoryPhase::Recalculating);
        history.finish_recalculation();
        assert_eq!(history.phase(), HistoryPhase::Stable);
    }
}
