//! The detection engine: free-running registry counter, pulse detection,
//! debounce, and the shared entropy queue.
//!
//! One [`EntropyEngine`] exists per process. It is shared behind an `Arc`
//! between the detection thread, which is the only writer of the counter and
//! the statistics, and the protocol server, which pops entries and reads
//! snapshots.
//!
//! ## Detection loop
//!
//! Each iteration reads one sample and opens a loop-timing window. A sample
//! above the pulse threshold pushes `(registry % 256, registry)` onto the
//! queue, bumps the pulse count and the rate counter, then waits for the
//! signal to fall back to baseline. If the debounce gives up while the signal
//! is still high, detection stays disarmed until a baseline sample is read, so
//! one physical pulse never queues more than one entry. The registry counter
//! advances on every iteration whether or not a pulse was seen, so the queued
//! value reflects sampling jitter relative to decay timing rather than the
//! decay rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::clock::{Clock, MonotonicClock, micros_to_secs};
use crate::queue::{DEFAULT_CAPACITY, EntropyEntry, EntropyQueue};
use crate::sensor::AnalogSource;
use crate::stats::{LoopTimingStats, RateCounter, StatsSnapshot};

/// Engine tuning. Defaults match the reference front end.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample level above which a particle strike is in progress.
    pub pulse_threshold: u16,
    /// Sample level at or below which the signal is back at baseline.
    pub baseline_threshold: u16,
    pub queue_capacity: usize,
    /// Pause between debounce polls.
    pub debounce_pause: Duration,
    /// Give up debouncing after this many polls. `None` waits forever.
    pub debounce_max_polls: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pulse_threshold: 2_500,
            baseline_threshold: 100,
            queue_capacity: DEFAULT_CAPACITY,
            debounce_pause: Duration::from_micros(10),
            debounce_max_polls: Some(100_000),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("detection loop already running")]
    AlreadyRunning,

    #[error("failed to spawn detection thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Outcome of [`wait_for_baseline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounce {
    /// A sample at or below the threshold was read after `polls` high samples.
    Settled { polls: u32 },
    /// The signal was still high after `polls` polls.
    TimedOut { polls: u32 },
}

/// Poll `source` until a sample at or below `baseline` appears.
///
/// Sleeps `pause` after every high sample. Stops early once `max_polls` high
/// samples have been seen.
pub fn wait_for_baseline(
    source: &mut dyn AnalogSource,
    baseline: u16,
    pause: Duration,
    max_polls: Option<u32>,
) -> Debounce {
    let mut polls = 0u32;
    loop {
        if source.read_sample() <= baseline {
            return Debounce::Settled { polls };
        }
        polls = polls.saturating_add(1);
        if max_polls.is_some_and(|max| polls >= max) {
            return Debounce::TimedOut { polls };
        }
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
}

/// Shared detection state.
pub struct EntropyEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    queue: EntropyQueue,
    registry: AtomicU32,
    detected: AtomicU64,
    cpm: RateCounter,
    loop_stats: LoopTimingStats,
    started_at_us: u64,
    detecting: AtomicBool,
    /// Set after a debounce timeout; cleared by the next baseline sample.
    disarmed: AtomicBool,
}

impl EntropyEngine {
    /// Initialize with the real monotonic clock.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Initialize against an explicit clock.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let cpm = RateCounter::new();
        cpm.start(clock.as_ref());
        log::info!(
            "engine initialized: pulse>{} baseline<={} capacity={}",
            config.pulse_threshold,
            config.baseline_threshold,
            config.queue_capacity
        );
        Self {
            queue: EntropyQueue::new(config.queue_capacity),
            started_at_us: clock.now_us(),
            config,
            clock,
            registry: AtomicU32::new(0),
            detected: AtomicU64::new(0),
            cpm,
            loop_stats: LoopTimingStats::new(),
            detecting: AtomicBool::new(false),
            disarmed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Launch the detection loop on its own thread and return immediately.
    ///
    /// The loop never exits. A second call fails with
    /// [`EngineError::AlreadyRunning`].
    pub fn start_detection<S>(self: &Arc<Self>, source: S) -> Result<JoinHandle<()>, EngineError>
    where
        S: AnalogSource + 'static,
    {
        if self.detecting.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyRunning);
        }
        let engine = Arc::clone(self);
        let spawned: std::io::Result<JoinHandle<()>> = std::thread::Builder::new()
            .name("detect".into())
            .spawn(move || engine.run_detection(source));
        match spawned {
            Ok(handle) => {
                log::info!("detection loop started");
                Ok(handle)
            }
            Err(e) => {
                self.detecting.store(false, Ordering::Release);
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Run the detection loop on the calling thread, forever.
    pub fn run_detection<S: AnalogSource>(&self, mut source: S) -> ! {
        loop {
            self.step(&mut source);
        }
    }

    /// One detection-loop iteration. Returns the entry queued, if any.
    pub fn step(&self, source: &mut dyn AnalogSource) -> Option<EntropyEntry> {
        let clock = self.clock.as_ref();
        let sample = source.read_sample();
        self.loop_stats.start(clock);

        let mut queued = None;
        if self.disarmed.load(Ordering::Relaxed) {
            if sample <= self.config.baseline_threshold {
                log::debug!("signal back at baseline, detection re-armed");
                self.disarmed.store(false, Ordering::Relaxed);
            }
        } else if sample > self.config.pulse_threshold {
            let entry = EntropyEntry::from_counter(self.registry.load(Ordering::Relaxed));
            if let Some(evicted) = self.queue.push(entry) {
                log::trace!("queue full, evicted {}:{}", evicted.value, evicted.source_counter);
            }
            self.detected.fetch_add(1, Ordering::Relaxed);
            self.cpm.update(clock);

            let debounce = wait_for_baseline(
                source,
                self.config.baseline_threshold,
                self.config.debounce_pause,
                self.config.debounce_max_polls,
            );
            if let Debounce::TimedOut { polls } = debounce {
                log::warn!("signal stuck above baseline after {polls} polls, disarming");
                self.disarmed.store(true, Ordering::Relaxed);
            }
            log::trace!("pulse {}:{}", entry.value, entry.source_counter);
            queued = Some(entry);
        }

        // Atomic add wraps silently on overflow.
        self.registry.fetch_add(1, Ordering::Relaxed);
        self.loop_stats.stop(clock);
        queued
    }

    /// Pop the oldest entry, or `(256, 0)` when the queue is empty.
    pub fn pop_entropy(&self) -> EntropyEntry {
        self.queue.pop().unwrap_or(EntropyEntry::INVALID)
    }

    /// Queue length right now.
    pub fn available_count(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &EntropyQueue {
        &self.queue
    }

    pub fn registry_counter(&self) -> u32 {
        self.registry.load(Ordering::Relaxed)
    }

    /// Pulses detected since initialization.
    pub fn detected_pulses(&self) -> u64 {
        self.detected.load(Ordering::Relaxed)
    }

    pub fn rate_counter(&self) -> &RateCounter {
        &self.cpm
    }

    pub fn loop_stats(&self) -> &LoopTimingStats {
        &self.loop_stats
    }

    pub fn uptime_secs(&self) -> u64 {
        micros_to_secs(self.clock.now_us().saturating_sub(self.started_at_us))
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cpm_last_minute: self.cpm.last_minute(),
            cpm_average: self.cpm.average(),
            completed_minutes: self.cpm.minutes(),
            loop_min_us: self.loop_stats.min(),
            loop_max_us: self.loop_stats.max(),
            loop_last_us: self.loop_stats.last(),
            loop_below_band: self.loop_stats.below(),
            loop_above_band: self.loop_stats.above(),
            detected_pulses: self.detected_pulses(),
            registry_counter: self.registry_counter(),
            available: self.available_count(),
            uptime_secs: self.uptime_secs(),
        }
    }

    /// `cpm:<last>:<avg>:loop:<min>:<max>:<below>:<above>`
    pub fn render_stats(&self) -> String {
        self.stats_snapshot().to_string()
    }
}
