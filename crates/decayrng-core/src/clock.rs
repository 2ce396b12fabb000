//! Monotonic time source and the start/stop stopwatch built on top of it.
//!
//! All timestamps are microseconds. The detection loop, the rate counter and
//! the loop-timing statistics share one [`Clock`] so tests can drive them from
//! a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Length of one rate-counter window.
pub const MINUTE_US: u64 = 60_000_000;

/// Monotonic microsecond clock.
pub trait Clock: Send + Sync {
    /// Current timestamp in microseconds. Never decreases.
    fn now_us(&self) -> u64;
}

/// Wall-independent clock backed by [`Instant`], relative to construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now.store(now_us, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_micros() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Microseconds to whole milliseconds.
pub fn micros_to_millis(elapsed_us: u64) -> u64 {
    elapsed_us / 1_000
}

/// Microseconds to whole seconds.
pub fn micros_to_secs(elapsed_us: u64) -> u64 {
    elapsed_us / 1_000_000
}

/// Latched start/stop timestamps.
///
/// Fields are atomics so a single writer (the detection thread) can update
/// them while readers take unsynchronized snapshots.
#[derive(Debug, Default)]
pub struct TimeStatistics {
    start: AtomicU64,
    stop: AtomicU64,
}

impl TimeStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_starting_time(&self, clock: &dyn Clock) {
        self.start.store(clock.now_us(), Ordering::Relaxed);
    }

    pub fn set_ending_time(&self, clock: &dyn Clock) {
        self.stop.store(clock.now_us(), Ordering::Relaxed);
    }

    /// Stop minus start. Saturates at zero if the clock was not monotonic.
    pub fn execution_time(&self) -> u64 {
        self.stop
            .load(Ordering::Relaxed)
            .saturating_sub(self.start.load(Ordering::Relaxed))
    }

    /// Time since the last `set_starting_time`.
    pub fn elapsed_since_start(&self, clock: &dyn Clock) -> u64 {
        clock.now_us().saturating_sub(self.start.load(Ordering::Relaxed))
    }

    pub fn is_minute_expired(&self, clock: &dyn Clock) -> bool {
        self.elapsed_since_start(clock) >= MINUTE_US
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_time_is_stop_minus_start() {
        let clock = ManualClock::new(1_000);
        let t = TimeStatistics::new();
        t.set_starting_time(&clock);
        clock.advance(Duration::from_micros(42));
        t.set_ending_time(&clock);
        assert_eq!(t.execution_time(), 42);
    }

    #[test]
    fn minute_expires_exactly_at_threshold() {
        let clock = ManualClock::new(0);
        let t = TimeStatistics::new();
        t.set_starting_time(&clock);
        clock.set(MINUTE_US - 1);
        assert!(!t.is_minute_expired(&clock));
        clock.set(MINUTE_US);
        assert!(t.is_minute_expired(&clock));
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
    }

    #[test]
    fn unit_conversions_truncate() {
        assert_eq!(micros_to_millis(1_999), 1);
        assert_eq!(micros_to_secs(2_500_000), 2);
    }
}
