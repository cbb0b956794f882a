//! Wall clock abstraction and rounding policy.
//!
//! The manager never reads `Utc::now()` directly; it goes through [`Clock`]
//! so tests can substitute a deterministic source. [`TimeRounding`] trims
//! issue/refresh instants and timeouts to a fixed granularity, keeping
//! `Timeout` header serialization and expiry comparisons stable.

use std::time::Duration;

use chrono::TimeZone;

use crate::types::Timestamp;

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

// ---------------------------------------------------------------------------
// TimeRounding
// ---------------------------------------------------------------------------

/// Rounding applied to issue times and timeouts.
///
/// Timestamps are floored to the granularity; timeouts are ceiled so a
/// positive request can never round down to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRounding {
    granularity_secs: u64,
}

impl TimeRounding {
    /// Whole-`secs` rounding. `secs` must be positive.
    pub const fn seconds(secs: u64) -> Self {
        assert!(secs > 0, "rounding granularity must be positive");
        Self {
            granularity_secs: secs,
        }
    }

    pub fn round_timestamp(&self, instant: Timestamp) -> Timestamp {
        let g = self.granularity_secs as i64;
        let floored = instant.timestamp().div_euclid(g) * g;
        chrono::Utc
            .timestamp_opt(floored, 0)
            .single()
            .unwrap_or(instant)
    }

    pub fn round_timeout(&self, timeout: Duration) -> Duration {
        let g = self.granularity_secs;
        let mut secs = timeout.as_secs();
        if timeout.subsec_nanos() > 0 {
            secs += 1;
        }
        let rounded = secs.div_ceil(g).max(1) * g;
        Duration::from_secs(rounded)
    }
}

impl Default for TimeRounding {
    fn default() -> Self {
        Self::seconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_floor_to_whole_seconds() {
        let rounding = TimeRounding::default();
        let instant = chrono::Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(
            rounding.round_timestamp(instant),
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn timeouts_ceil_to_whole_seconds() {
        let rounding = TimeRounding::default();
        assert_eq!(
            rounding.round_timeout(Duration::from_millis(1500)),
            Duration::from_secs(2)
        );
        assert_eq!(
            rounding.round_timeout(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn sub_granule_timeout_never_rounds_to_zero() {
        let rounding = TimeRounding::seconds(5);
        assert_eq!(
            rounding.round_timeout(Duration::from_millis(10)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn coarse_granularity_applies_to_both() {
        let rounding = TimeRounding::seconds(10);
        let instant = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 17).unwrap();
        assert_eq!(
            rounding.round_timestamp(instant),
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 10).unwrap()
        );
        assert_eq!(
            rounding.round_timeout(Duration::from_secs(11)),
            Duration::from_secs(20)
        );
    }
}
