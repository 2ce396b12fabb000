pub mod client;
pub mod serve;
pub mod stats;

use std::time::Duration;

use decayrng_core::{EngineConfig, SimulatedDetectorConfig};

/// Build the engine configuration from CLI thresholds.
pub fn engine_config(
    pulse_threshold: u16,
    baseline_threshold: u16,
    queue_capacity: usize,
) -> EngineConfig {
    EngineConfig {
        pulse_threshold,
        baseline_threshold,
        queue_capacity,
        ..Default::default()
    }
}

/// Build the simulated front end from CLI rate/period.
pub fn detector_config(
    counts_per_minute: f64,
    sample_period_us: u64,
    seed: Option<u64>,
) -> SimulatedDetectorConfig {
    SimulatedDetectorConfig {
        counts_per_minute,
        sample_period: Duration::from_micros(sample_period_us),
        seed,
        ..Default::default()
    }
}
