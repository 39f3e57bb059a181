//! Timestamp utilities and the injectable clock
//!
//! Cache validity is decided against a [`Clock`] rather than the system time
//! directly so TTL expiry can be driven deterministically in tests.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Convert epoch milliseconds to a UTC timestamp
///
/// Returns `None` for values outside chrono's representable range.
pub fn epoch_millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Source of "now" for TTL and session bookkeeping
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Current time as a UTC timestamp
    fn now(&self) -> DateTime<Utc> {
        epoch_millis_to_datetime(self.now_millis()).unwrap_or_else(Utc::now)
    }
}

/// Wall clock backed by [`Utc::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock
///
/// Clones share the same instant, so a test can keep one handle and advance
/// time under a cache that holds another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start at the given epoch milliseconds
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, duration: std::time::Duration) {
        self.millis
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_epoch_millis_round_trip() {
        let dt = epoch_millis_to_datetime(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_system_clock_tracks_wall_time() {
        let before = Utc::now().timestamp_millis();
        let clock_now = SystemClock.now_millis();
        let after = Utc::now().timestamp_millis();
        assert!(clock_now >= before && clock_now <= after);
    }

    #[test]
    fn test_manual_clock_advance_is_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let handle = clock.clone();

        handle.advance(Duration::from_secs(2));

        assert_eq!(clock.now_millis(), 3_000);
        assert_eq!(clock.now().timestamp_millis(), 3_000);
    }
}
