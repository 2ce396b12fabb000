//! # decayrng-core
//!
//! **Random numbers from radioactive decay.**
//!
//! A detection loop samples an analog front end (a Geiger tube behind a
//! comparator, or a simulation of one) while a free-running registry counter
//! ticks once per iteration. Every particle strike snapshots the counter and
//! queues `counter % 256` as one random byte.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use decayrng_core::{EngineConfig, EntropyEngine, SimulatedDetector, SimulatedDetectorConfig};
//!
//! let engine = Arc::new(EntropyEngine::new(EngineConfig::default()));
//! engine
//!     .start_detection(SimulatedDetector::new(SimulatedDetectorConfig::default()))
//!     .expect("detection thread");
//!
//! let entry = engine.pop_entropy();
//! println!("{}:{}:{}", entry.value, entry.source_counter, engine.available_count());
//! println!("{}", engine.render_stats());
//! ```
//!
//! ## Architecture
//!
//! AnalogSource → detection loop → EntropyQueue (bounded, drop-oldest) → reader
//!
//! The loop also feeds two diagnostics: a counts-per-minute [`RateCounter`]
//! and [`LoopTimingStats`], which classifies each iteration's duration as
//! plausible, too short (noise) or too long (stall).

pub mod clock;
pub mod engine;
pub mod queue;
pub mod sensor;
pub mod stats;

pub use clock::{Clock, MINUTE_US, ManualClock, MonotonicClock, TimeStatistics};
pub use engine::{Debounce, EngineConfig, EngineError, EntropyEngine, wait_for_baseline};
pub use queue::{DEFAULT_CAPACITY, EntropyEntry, EntropyQueue, INVALID_RESULT, MAX_RESULT};
pub use sensor::{AnalogSource, ScriptedSource, SimulatedDetector, SimulatedDetectorConfig};
pub use stats::{LOOP_BAND_MAX_US, LOOP_BAND_MIN_US, LoopTimingStats, RateCounter, StatsSnapshot};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Report an unrecoverable setup failure and idle forever.
pub fn halt(msg: &str) -> ! {
    log::error!("abort: {msg}");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}
