//! Detection-loop timing classification and the counts-per-minute meter.
//!
//! Both accumulators follow a single-writer / many-reader discipline: only the
//! detection thread mutates them, while the protocol server reads lock-free
//! snapshots. Every field is an independent atomic, so a snapshot taken while
//! the writer is mid-update may mix old and new values. That is acceptable for
//! diagnostics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::clock::{Clock, TimeStatistics};

/// Shortest plausible loop iteration (µs). Anything below is noise.
pub const LOOP_BAND_MIN_US: u64 = 3;
/// Longest plausible loop iteration (µs). Anything above is a stall.
pub const LOOP_BAND_MAX_US: u64 = 2_500;

// ---------------------------------------------------------------------------
// Loop timing
// ---------------------------------------------------------------------------

/// Classifies detection-loop iteration durations against the
/// `[LOOP_BAND_MIN_US, LOOP_BAND_MAX_US]` band.
///
/// In-band durations move the running min/max. Out-of-band durations are only
/// tallied, one counter per side.
#[derive(Debug)]
pub struct LoopTimingStats {
    timer: TimeStatistics,
    max: AtomicU64,
    min: AtomicU64,
    last: AtomicU64,
    below: AtomicU64,
    above: AtomicU64,
}

impl Default for LoopTimingStats {
    fn default() -> Self {
        Self {
            timer: TimeStatistics::new(),
            max: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            last: AtomicU64::new(0),
            below: AtomicU64::new(0),
            above: AtomicU64::new(0),
        }
    }
}

impl LoopTimingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a measurement window.
    pub fn start(&self, clock: &dyn Clock) {
        self.timer.set_starting_time(clock);
    }

    /// Close the window opened by [`start`](Self::start) and classify it.
    pub fn stop(&self, clock: &dyn Clock) -> u64 {
        self.timer.set_ending_time(clock);
        let duration = self.timer.execution_time();
        self.record(duration);
        duration
    }

    /// Classify one iteration duration.
    pub fn record(&self, duration_us: u64) {
        self.last.store(duration_us, Ordering::Relaxed);
        if (LOOP_BAND_MIN_US..=LOOP_BAND_MAX_US).contains(&duration_us) {
            if duration_us > self.max.load(Ordering::Relaxed) {
                self.max.store(duration_us, Ordering::Relaxed);
            }
            if duration_us < self.min.load(Ordering::Relaxed) {
                self.min.store(duration_us, Ordering::Relaxed);
            }
        } else if duration_us < LOOP_BAND_MIN_US {
            self.below.fetch_add(1, Ordering::Relaxed);
        } else {
            self.above.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Longest in-band iteration, 0 if none yet.
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Shortest in-band iteration, `None` until one has been observed.
    pub fn min(&self) -> Option<u64> {
        match self.min.load(Ordering::Relaxed) {
            u64::MAX => None,
            v => Some(v),
        }
    }

    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }

    /// Iterations shorter than the band.
    pub fn below(&self) -> u64 {
        self.below.load(Ordering::Relaxed)
    }

    /// Iterations longer than the band.
    pub fn above(&self) -> u64 {
        self.above.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Counts per minute
// ---------------------------------------------------------------------------

/// Rolling per-minute pulse counter with a lifetime average.
///
/// The in-progress tally rolls over into `last_minute` on the first pulse
/// observed after a minute has elapsed, so the rollover pulse belongs to the
/// minute it closes.
#[derive(Debug, Default)]
pub struct RateCounter {
    timer: TimeStatistics,
    in_minute: AtomicU64,
    last_minute: AtomicU64,
    sum: AtomicU64,
    minutes: AtomicU64,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the first minute window.
    pub fn start(&self, clock: &dyn Clock) {
        self.timer.set_starting_time(clock);
    }

    /// Register one detected pulse.
    pub fn update(&self, clock: &dyn Clock) {
        let tally = self.in_minute.fetch_add(1, Ordering::Relaxed) + 1;
        if self.timer.is_minute_expired(clock) {
            self.sum.fetch_add(tally, Ordering::Relaxed);
            self.last_minute.store(tally, Ordering::Relaxed);
            self.in_minute.store(0, Ordering::Relaxed);
            self.minutes.fetch_add(1, Ordering::Relaxed);
            self.timer.set_starting_time(clock);
        }
    }

    /// Pulse count of the last completed minute.
    pub fn last_minute(&self) -> u64 {
        self.last_minute.load(Ordering::Relaxed)
    }

    /// Pulses counted so far in the open minute.
    pub fn in_progress(&self) -> u64 {
        self.in_minute.load(Ordering::Relaxed)
    }

    /// Completed minutes.
    pub fn minutes(&self) -> u64 {
        self.minutes.load(Ordering::Relaxed)
    }

    /// Mean pulses per completed minute, `None` before the first rollover.
    pub fn average(&self) -> Option<u64> {
        match self.minutes.load(Ordering::Relaxed) {
            0 => None,
            minutes => Some(self.sum.load(Ordering::Relaxed) / minutes),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of the engine's statistics.
///
/// `Display` renders the wire line
/// `cpm:<last>:<avg>:loop:<min>:<max>:<below>:<above>` (no newline), with
/// missing average/minimum rendered as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cpm_last_minute: u64,
    pub cpm_average: Option<u64>,
    pub completed_minutes: u64,
    pub loop_min_us: Option<u64>,
    pub loop_max_us: u64,
    pub loop_last_us: u64,
    pub loop_below_band: u64,
    pub loop_above_band: u64,
    pub detected_pulses: u64,
    pub registry_counter: u32,
    pub available: usize,
    pub uptime_secs: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpm:{}:{}:loop:{}:{}:{}:{}",
            self.cpm_last_minute,
            self.cpm_average.unwrap_or(0),
            self.loop_min_us.unwrap_or(0),
            self.loop_max_us,
            self.loop_below_band,
            self.loop_above_band,
        )
    }
}
