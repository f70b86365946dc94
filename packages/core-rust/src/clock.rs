//! Wall-clock abstraction used to stamp auto-now fields.
//!
//! Injected into the save path so tests can substitute a fixed instant for
//! the real system clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Source of the current time as milliseconds since the Unix epoch.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> u64;

    /// Current time as a naive UTC timestamp, saturating at the epoch on
    /// out-of-range values.
    fn now_utc(&self) -> NaiveDateTime {
        i64::try_from(self.now())
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default()
            .naive_utc()
    }
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    // Millisecond timestamps fit in u64 for the next 584 million years.
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock frozen at a settable instant.
#[derive(Debug, Default)]
pub struct FixedClock {
    millis: AtomicU64,
}

impl FixedClock {
    #[must_use]
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Moves the clock to `millis`.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Advances the clock by `delta` milliseconds.
    pub fn advance(&self, delta: u64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl ClockSource for FixedClock {
    fn now(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_converts_to_utc() {
        let clock = FixedClock::new(1_700_000_000_123);
        let now = clock.now_utc();
        assert_eq!(now.and_utc().timestamp_millis(), 1_700_000_000_123);
        clock.advance(1_000);
        assert_eq!(clock.now_utc().and_utc().timestamp_millis(), 1_700_000_001_123);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800_000);
    }
}
