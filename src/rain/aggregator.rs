/// Rolling rainfall totals derived from the stored history
use time::{OffsetDateTime, Time, UtcOffset};

use crate::rain::history::HistoryStore;
use crate::utils::round_to_tenth;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Rain totals in mm, rounded to one decimal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RainTotals {
    pub last_hour: f64,
    pub last_24h: f64,
    pub today: f64,
}

impl RainTotals {
    /// Compute the three windows for the reading `(ts, value)`
    ///
    /// # Arguments
    /// * `history` - Stored samples, already updated with this reading
    /// * `ts` - Unix seconds of the reading
    /// * `value` - Cumulative precipitation in mm
    /// * `offset` - Local UTC offset used to find the start of the day
    ///
    /// # Returns
    /// Non-negative totals rounded to 0.1 mm; windows without a baseline
    /// report 0
    pub fn compute(history: &HistoryStore, ts: i64, value: f64, offset: UtcOffset) -> Self {
        let delta = |baseline: Option<f64>| match baseline {
            Some(baseline) => round_to_tenth((value - baseline).max(0.0)),
            None => 0.0,
        };

        let today_baseline =
            local_midnight(ts, offset).and_then(|midnight| history.first_at_or_after(midnight));

        RainTotals {
            last_hour: delta(history.closest_value(ts - HOUR_SECS)),
            last_24h: delta(history.closest_value(ts - DAY_SECS)),
            today: delta(today_baseline),
        }
    }
}

/// Unix timestamp of local midnight for the day containing `ts`
pub fn local_midnight(ts: i64, offset: UtcOffset) -> Option<i64> {
    let local = OffsetDateTime::from_unix_timestamp(ts).ok()?.to_offset(offset);
    Some(local.replace_time(Time::MIDNIGHT).unix_timestamp())
}

/// Local UTC offset in effect at `ts`, or `fallback` when the platform
/// cannot tell us (e.g. multi-threaded processes on Linux)
pub fn local_offset_at(ts: i64, fallback: UtcOffset) -> UtcOffset {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| UtcOffset::local_offset_at(dt).ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rain::history::HistoryEntry;
    use time::macros::{datetime, offset};

    #[test]
    fn test_local_midnight_utc() {
        let ts = datetime!(2024-06-01 14:30:00 UTC).unix_timestamp();
        let midnight = datetime!(2024-06-01 00:00:00 UTC).unix_timestamp();
        assert_eq!(local_midnight(ts, UtcOffset::UTC), Some(midnight));
    }

    #[test]
    fn test_local_midnight_respects_offset() {
        // 23:30 UTC on June 1st is already June 2nd in UTC+2
        let ts = datetime!(2024-06-01 23:30:00 UTC).unix_timestamp();
        let midnight = datetime!(2024-06-02 00:00:00 +2).unix_timestamp();
        assert_eq!(local_midnight(ts, offset!(+2)), Some(midnight));

        // 01:00 UTC is still the previous day in UTC-5
        let ts = datetime!(2024-06-02 01:00:00 UTC).unix_timestamp();
        let midnight = datetime!(2024-06-01 00:00:00 -5).unix_timestamp();
        assert_eq!(local_midnight(ts, offset!(-5)), Some(midnight));
    }

    #[test]
    fn test_rain_today_from_midnight_baseline() {
        let midnight = datetime!(2024-06-01 00:00:00 +1).unix_timestamp();
        let history = HistoryStore::from_entries(vec![
            HistoryEntry { ts: midnight - 600, value: 4.0 },
            HistoryEntry { ts: midnight, value: 5.0 },
            HistoryEntry { ts: midnight + 3600, value: 6.0 },
        ]);

        let totals = RainTotals::compute(&history, midnight + 2 * 3600, 8.3, offset!(+1));
        assert_eq!(totals.today, 3.3);
        assert_eq!(totals.last_hour, 2.3);
    }

    #[test]
    fn test_rolling_windows_use_closest_sample() {
        let now = 1_700_000_000;
        let history = HistoryStore::from_entries(vec![
            HistoryEntry { ts: now - DAY_SECS - 120, value: 1.0 },
            HistoryEntry { ts: now - DAY_SECS + 30, value: 1.5 },
            HistoryEntry { ts: now - HOUR_SECS - 50, value: 9.0 },
            HistoryEntry { ts: now - HOUR_SECS + 70, value: 9.4 },
        ]);

        let totals = RainTotals::compute(&history, now, 10.0, UtcOffset::UTC);
        assert_eq!(totals.last_24h, 8.5);
        assert_eq!(totals.last_hour, 1.0);
    }

    #[test]
    fn test_no_baseline_reports_zero() {
        let totals = RainTotals::compute(&HistoryStore::default(), 1_700_000_000, 12.0, UtcOffset::UTC);
        assert_eq!(totals, RainTotals::default());
    }

    #[test]
    fn test_today_without_sample_since_midnight_is_zero() {
        let midnight = datetime!(2024-06-01 00:00:00 UTC).unix_timestamp();
        let history = HistoryStore::from_entries(vec![HistoryEntry {
            ts: midnight - 60,
            value: 2.0,
        }]);

        let totals = RainTotals::compute(&history, midnight + 30, 2.5, UtcOffset::UTC);
        assert_eq!(totals.today, 0.0);
        assert_eq!(totals.last_hour, 0.5);
    }

    #[test]
    fn test_negative_delta_is_clamped() {
        let history = HistoryStore::from_entries(vec![HistoryEntry {
            ts: 1_700_000_000 - HOUR_SECS,
            value: 7.0,
        }]);

        let totals = RainTotals::compute(&history, 1_700_000_000, 6.0, UtcOffset::UTC);
        assert_eq!(totals.last_hour, 0.0);
    }

    #[test]
    fn test_local_offset_at_falls_back_on_bad_timestamp() {
        assert_eq!(local_offset_at(i64::MAX, offset!(+3)), offset!(+3));
    }
}
