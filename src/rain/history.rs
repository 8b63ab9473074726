/// Persisted rainfall time series with counter-reset detection
///
/// The WS90 reports precipitation as a cumulative counter. We keep one
/// sample per minute for the last 25 hours so rolling totals can be
/// computed against a historical baseline. A drop in the counter means the
/// sensor restarted or the uint16 counter wrapped; the baseline is then
/// meaningless and the whole history is discarded.
use serde::{Deserialize, Serialize};

/// Minimum spacing between stored samples
pub const DOWNSAMPLE_INTERVAL_SECS: i64 = 60;

/// Samples older than this relative to the newest ingest are pruned
pub const RETENTION_SECS: i64 = 25 * 3600;

/// One stored rainfall sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix seconds
    pub ts: i64,
    /// Cumulative precipitation in mm
    pub value: f64,
}

/// What a single `ingest` call did to the stored sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub reset: bool,
    pub appended: bool,
    pub pruned: usize,
}

impl IngestOutcome {
    /// The sequence changed and must be written back to storage
    pub fn changed(&self) -> bool {
        self.reset || self.appended || self.pruned > 0
    }
}

/// Rolling rainfall state for one station
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    last_stored_ts: i64,
    last_value: Option<f64>,
}

impl HistoryStore {
    /// Restore from a persisted sequence
    ///
    /// The newest entry becomes both the downsampling reference and the
    /// baseline for reset detection.
    pub fn from_entries(mut entries: Vec<HistoryEntry>) -> Self {
        entries.retain(|e| e.value.is_finite());
        entries.sort_by_key(|e| e.ts);
        entries.dedup_by_key(|e| e.ts);

        let (last_stored_ts, last_value) = match entries.last() {
            Some(last) => (last.ts, Some(last.value)),
            None => (0, None),
        };

        HistoryStore {
            entries,
            last_stored_ts,
            last_value,
        }
    }

    /// Fold a persisted sequence that was loaded after ingesting started
    ///
    /// Only stored entries at least one downsampling interval older than
    /// the oldest live sample are kept. When the newest stored value is
    /// above the oldest live value the counter reset in between and the
    /// stored entries are discarded. Returns whether anything was merged.
    pub fn merge_restored(&mut self, restored: Vec<HistoryEntry>) -> bool {
        let restored = HistoryStore::from_entries(restored);
        let (Some(first_live), Some(newest_live)) =
            (self.entries.first().copied(), self.entries.last().copied())
        else {
            *self = restored;
            return false;
        };

        if restored.last_value.is_some_and(|stored| stored > first_live.value) {
            return false;
        }

        let cutoff = newest_live.ts - RETENTION_SECS;
        let mut merged: Vec<HistoryEntry> = restored
            .entries
            .into_iter()
            .filter(|e| e.ts >= cutoff && e.ts + DOWNSAMPLE_INTERVAL_SECS <= first_live.ts)
            .collect();
        if merged.is_empty() {
            return false;
        }

        merged.append(&mut self.entries);
        self.entries = merged;
        true
    }

    /// Feed the latest cumulative precipitation reading
    pub fn ingest(&mut self, ts: i64, value: f64) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();

        if let Some(previous) = self.last_value {
            if value < previous {
                self.entries.clear();
                self.last_stored_ts = 0;
                outcome.reset = true;
            }
        }
        self.last_value = Some(value);

        if self.entries.is_empty() || ts - self.last_stored_ts >= DOWNSAMPLE_INTERVAL_SECS {
            self.append(HistoryEntry { ts, value });
            outcome.appended = true;
        }

        outcome.pruned = self.prune_before(ts - RETENTION_SECS);
        outcome
    }

    fn append(&mut self, entry: HistoryEntry) {
        self.last_stored_ts = entry.ts;
        self.entries.push(entry);
    }

    /// Drop every entry with `ts < cutoff`, returning how many were removed
    fn prune_before(&mut self, cutoff: i64) -> usize {
        let stale = self.entries.partition_point(|e| e.ts < cutoff);
        self.entries.drain(..stale);
        stale
    }

    /// Value of the entry nearest to `target`; earliest entry wins a tie
    pub fn closest_value(&self, target: i64) -> Option<f64> {
        let mut best: Option<(i64, f64)> = None;
        for entry in &self.entries {
            let distance = (entry.ts - target).abs();
            match best {
                Some((best_distance, _)) if distance >= best_distance => {}
                _ => best = Some((distance, entry.value)),
            }
        }
        best.map(|(_, value)| value)
    }

    /// Value of the first entry at or after `target`
    pub fn first_at_or_after(&self, target: i64) -> Option<f64> {
        let index = self.entries.partition_point(|e| e.ts < target);
        self.entries.get(index).map(|e| e.value)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Last cumulative value seen, stored or not
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_first_ingest_is_stored() {
        let mut store = HistoryStore::default();
        let outcome = store.ingest(T0, 10.0);

        assert!(outcome.appended);
        assert!(!outcome.reset);
        assert!(outcome.changed());
        assert_eq!(store.entries(), &[HistoryEntry { ts: T0, value: 10.0 }]);
    }

    #[test]
    fn test_downsampling_skips_samples_within_a_minute() {
        let mut store = HistoryStore::default();
        store.ingest(T0, 10.0);
        let second = store.ingest(T0 + 30, 10.2);
        let third = store.ingest(T0 + 59, 10.5);

        assert!(!second.changed());
        assert!(!third.changed());
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_value(), Some(10.5));

        let fourth = store.ingest(T0 + 60, 10.7);
        assert!(fourth.appended);
        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[1], HistoryEntry { ts: T0 + 60, value: 10.7 });
    }

    #[test]
    fn test_downsampling_is_relative_to_last_stored_sample() {
        let mut store = HistoryStore::default();
        store.ingest(T0, 1.0);
        store.ingest(T0 + 30, 1.0);
        store.ingest(T0 + 75, 1.0);
        store.ingest(T0 + 120, 1.0);

        let stamps: Vec<i64> = store.entries().iter().map(|e| e.ts).collect();
        assert_eq!(stamps, vec![T0, T0 + 75]);
    }

    #[test]
    fn test_counter_drop_clears_history() {
        let mut store = HistoryStore::default();
        for i in 0..5 {
            store.ingest(T0 + i * 60, 46.0 + i as f64);
        }
        assert_eq!(store.last_value(), Some(50.0));

        let outcome = store.ingest(T0 + 300, 3.0);
        assert!(outcome.reset);
        assert!(outcome.appended);
        assert_eq!(store.entries(), &[HistoryEntry { ts: T0 + 300, value: 3.0 }]);
        assert_eq!(store.last_value(), Some(3.0));
    }

    #[test]
    fn test_reset_within_downsample_window_still_stores_new_baseline() {
        let mut store = HistoryStore::default();
        store.ingest(T0, 50.0);
        let outcome = store.ingest(T0 + 10, 0.5);

        assert!(outcome.reset);
        assert_eq!(store.entries(), &[HistoryEntry { ts: T0 + 10, value: 0.5 }]);
    }

    #[test]
    fn test_unstored_sample_still_drives_reset_detection() {
        let mut store = HistoryStore::default();
        store.ingest(T0, 10.0);
        // Not stored, but becomes the reference value
        store.ingest(T0 + 20, 12.0);
        let outcome = store.ingest(T0 + 40, 11.0);

        assert!(outcome.reset);
        assert_eq!(store.entries(), &[HistoryEntry { ts: T0 + 40, value: 11.0 }]);
    }

    #[test]
    fn test_prunes_entries_older_than_retention() {
        let mut store = HistoryStore::default();
        store.ingest(T0, 1.0);
        store.ingest(T0 + 3600, 2.0);

        let outcome = store.ingest(T0 + RETENTION_SECS + 1, 3.0);
        assert_eq!(outcome.pruned, 1);
        assert_eq!(store.entries()[0].ts, T0 + 3600);

        // Entry exactly at the cutoff survives
        let outcome = store.ingest(T0 + 3600 + RETENTION_SECS, 3.0);
        assert_eq!(outcome.pruned, 0);
        assert_eq!(store.entries()[0].ts, T0 + 3600);
    }

    #[test]
    fn test_prunes_even_when_sample_is_not_stored() {
        let mut store = HistoryStore::default();
        store.ingest(T0, 1.0);
        store.ingest(T0 + RETENTION_SECS - 30, 2.0);

        let outcome = store.ingest(T0 + RETENTION_SECS + 10, 2.0);
        assert!(!outcome.appended);
        assert_eq!(outcome.pruned, 1);
        assert!(outcome.changed());
    }

    #[test]
    fn test_closest_value() {
        let store = HistoryStore::from_entries(vec![
            HistoryEntry { ts: 100, value: 1.0 },
            HistoryEntry { ts: 200, value: 2.0 },
            HistoryEntry { ts: 300, value: 3.0 },
        ]);

        assert_eq!(store.closest_value(0), Some(1.0));
        assert_eq!(store.closest_value(240), Some(2.0));
        assert_eq!(store.closest_value(260), Some(3.0));
        assert_eq!(store.closest_value(10_000), Some(3.0));
        // Equidistant: earliest wins
        assert_eq!(store.closest_value(250), Some(2.0));
    }

    #[test]
    fn test_queries_on_empty_store() {
        let store = HistoryStore::default();
        assert_eq!(store.closest_value(T0), None);
        assert_eq!(store.first_at_or_after(T0), None);
    }

    #[test]
    fn test_first_at_or_after() {
        let store = HistoryStore::from_entries(vec![
            HistoryEntry { ts: 100, value: 1.0 },
            HistoryEntry { ts: 200, value: 2.0 },
        ]);

        assert_eq!(store.first_at_or_after(50), Some(1.0));
        assert_eq!(store.first_at_or_after(100), Some(1.0));
        assert_eq!(store.first_at_or_after(101), Some(2.0));
        assert_eq!(store.first_at_or_after(201), None);
    }

    #[test]
    fn test_from_entries_restores_baselines() {
        let mut store = HistoryStore::from_entries(vec![
            HistoryEntry { ts: T0 + 60, value: 5.5 },
            HistoryEntry { ts: T0, value: 5.0 },
            HistoryEntry { ts: T0 + 30, value: f64::NAN },
        ]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].ts, T0);
        assert_eq!(store.last_value(), Some(5.5));

        // Within a minute of the restored newest entry: not stored
        assert!(!store.ingest(T0 + 90, 5.6).appended);
        // Lower than the restored value: reset
        assert!(store.ingest(T0 + 200, 1.0).reset);
    }

    #[test]
    fn test_merge_restored_into_empty_store_adopts_it() {
        let mut store = HistoryStore::default();
        let merged = store.merge_restored(vec![
            HistoryEntry { ts: T0, value: 4.0 },
            HistoryEntry { ts: T0 + 60, value: 4.5 },
        ]);

        assert!(!merged);
        assert_eq!(store.len(), 2);
        assert_eq!(store.last_value(), Some(4.5));
        assert!(store.ingest(T0 + 70, 1.0).reset);
    }

    #[test]
    fn test_merge_restored_keeps_older_stored_samples() {
        let mut store = HistoryStore::default();
        store.ingest(T0 + 3600, 6.0);
        store.ingest(T0 + 3660, 6.2);

        let merged = store.merge_restored(vec![
            HistoryEntry { ts: T0 - RETENTION_SECS, value: 1.0 },
            HistoryEntry { ts: T0, value: 5.0 },
            HistoryEntry { ts: T0 + 3580, value: 5.9 },
        ]);

        assert!(merged);
        let stamps: Vec<i64> = store.entries().iter().map(|e| e.ts).collect();
        assert_eq!(stamps, vec![T0, T0 + 3600, T0 + 3660]);
        // Live values keep driving reset detection and downsampling
        assert_eq!(store.last_value(), Some(6.2));
        assert!(!store.ingest(T0 + 3700, 6.3).appended);
        assert_eq!(store.closest_value(T0), Some(5.0));
    }

    #[test]
    fn test_merge_restored_discards_stored_samples_across_a_reset() {
        let mut store = HistoryStore::default();
        store.ingest(T0 + 3600, 0.4);

        let merged = store.merge_restored(vec![HistoryEntry { ts: T0, value: 80.0 }]);
        assert!(!merged);
        assert_eq!(store.entries(), &[HistoryEntry { ts: T0 + 3600, value: 0.4 }]);
    }

    #[test]
    fn test_history_entry_json_layout() {
        let entry = HistoryEntry { ts: 1_700_000_000, value: 12.5 };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"ts":1700000000,"value":12.5}"#);

        let restored: Vec<HistoryEntry> = serde_json::from_str(&format!("[{json}]")).unwrap();
        assert_eq!(restored, vec![entry]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// After every ingest nothing older than the retention window
        /// remains and the sequence stays sorted and downsampled.
        #[test]
        fn history_stays_bounded_and_sorted(
            steps in proptest::collection::vec((1i64..600, -5.0f64..20.0), 1..400)
        ) {
            let mut store = HistoryStore::default();
            let mut ts = 1_700_000_000i64;
            let mut value = 0.0f64;

            for (dt, delta) in steps {
                ts += dt * 30;
                value = (value + delta).max(0.0);
                store.ingest(ts, value);

                let entries = store.entries();
                prop_assert!(entries.iter().all(|e| e.ts >= ts - RETENTION_SECS));
                prop_assert!(entries.windows(2).all(|w| w[1].ts - w[0].ts >= DOWNSAMPLE_INTERVAL_SECS));
                prop_assert!(entries.len() as i64 <= RETENTION_SECS / DOWNSAMPLE_INTERVAL_SECS + 1);
            }
        }
    }
}
