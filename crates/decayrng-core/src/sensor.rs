//! Analog front-end abstraction.
//!
//! The detection loop only needs "give me the next sample". On hardware that
//! is an ADC conversion; on a host it is one of the sources below.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Full scale of a 12-bit converter.
pub const ADC_FULL_SCALE: u16 = 4_095;

/// Interarrival used when the configured rate yields no usable delay.
const NEVER: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Anything that yields analog samples on demand.
pub trait AnalogSource: Send {
    fn read_sample(&mut self) -> u16;
}

impl<S: AnalogSource + ?Sized> AnalogSource for Box<S> {
    fn read_sample(&mut self) -> u16 {
        (**self).read_sample()
    }
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of samples, then idles at a constant level.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    samples: VecDeque<u16>,
    idle: u16,
    reads: u64,
}

impl ScriptedSource {
    pub fn new(samples: impl IntoIterator<Item = u16>, idle: u16) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            idle,
            reads: 0,
        }
    }

    /// A source that never leaves `level`.
    pub fn constant(level: u16) -> Self {
        Self::new([], level)
    }

    /// Samples still queued before the idle level takes over.
    pub fn remaining(&self) -> usize {
        self.samples.len()
    }

    /// Total samples handed out so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl AnalogSource for ScriptedSource {
    fn read_sample(&mut self) -> u16 {
        self.reads += 1;
        self.samples.pop_front().unwrap_or(self.idle)
    }
}

// ---------------------------------------------------------------------------
// Simulated Geiger tube
// ---------------------------------------------------------------------------

/// Parameters for [`SimulatedDetector`].
#[derive(Debug, Clone)]
pub struct SimulatedDetectorConfig {
    /// Mean pulse rate.
    pub counts_per_minute: f64,
    /// Sleep per read, modelling conversion time. Zero disables sleeping.
    pub sample_period: Duration,
    /// Reads a pulse takes to decay from its peak back to baseline.
    pub pulse_reads: u32,
    /// Upper bound of the idle noise floor.
    pub noise_floor: u16,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulatedDetectorConfig {
    fn default() -> Self {
        Self {
            counts_per_minute: 30.0,
            sample_period: Duration::from_micros(20),
            pulse_reads: 8,
            noise_floor: 60,
            seed: None,
        }
    }
}

/// Host stand-in for a tube + comparator front end.
///
/// Pulses arrive as a Poisson process (exponential inter-arrival times in wall
/// clock) and decay linearly from a random peak near full scale.
pub struct SimulatedDetector {
    config: SimulatedDetectorConfig,
    rng: StdRng,
    next_pulse: Instant,
    /// Remaining samples of the pulse in flight, and its peak.
    tail: Option<(u32, u16)>,
}

impl SimulatedDetector {
    pub fn new(config: SimulatedDetectorConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let next_pulse = Instant::now() + Self::interarrival(&mut rng, config.counts_per_minute);
        Self {
            config,
            rng,
            next_pulse,
            tail: None,
        }
    }

    fn interarrival(rng: &mut StdRng, cpm: f64) -> Duration {
        if cpm.is_nan() || cpm <= 0.0 {
            return NEVER;
        }
        let mean_secs = 60.0 / cpm;
        // 1 - U keeps ln() away from zero.
        let u: f64 = 1.0 - rng.random::<f64>();
        Duration::try_from_secs_f64(u.ln().abs() * mean_secs)
            .unwrap_or(NEVER)
            .min(NEVER)
    }

    fn noise(&mut self) -> u16 {
        self.rng.random_range(0..=self.config.noise_floor)
    }
}

impl AnalogSource for SimulatedDetector {
    fn read_sample(&mut self) -> u16 {
        if !self.config.sample_period.is_zero() {
            std::thread::sleep(self.config.sample_period);
        }

        if let Some((left, peak)) = self.tail {
            let total = self.config.pulse_reads.max(1);
            self.tail = left.checked_sub(1).filter(|&l| l > 0).map(|l| (l, peak));
            let level = (peak as u32 * left / total) as u16;
            return level.max(self.noise());
        }

        let now = Instant::now();
        if now >= self.next_pulse {
            let peak = self.rng.random_range(ADC_FULL_SCALE - 800..=ADC_FULL_SCALE);
            self.tail = Some((self.config.pulse_reads, peak));
            self.next_pulse =
                now + Self::interarrival(&mut self.rng, self.config.counts_per_minute);
            return peak;
        }

        self.noise()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_source_replays_then_idles() {
        let mut src = ScriptedSource::new([1, 2, 3], 7);
        let got: Vec<u16> = (0..5).map(|_| src.read_sample()).collect();
        assert_eq!(got, vec![1, 2, 3, 7, 7]);
        assert_eq!(src.reads(), 5);
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn simulated_detector_produces_pulses_and_returns_to_baseline() {
        let mut det = SimulatedDetector::new(SimulatedDetectorConfig {
            counts_per_minute: 6_000_000.0,
            sample_period: Duration::ZERO,
            pulse_reads: 4,
            noise_floor: 10,
            seed: Some(7),
        });

        let samples: Vec<u16> = (0..20_000).map(|_| det.read_sample()).collect();
        assert!(samples.iter().any(|&s| s > 2_500), "no pulse observed");
        assert!(samples.iter().any(|&s| s <= 10), "never back at baseline");
        assert!(samples.iter().all(|&s| s <= ADC_FULL_SCALE));
    }

    #[test]
    fn zero_rate_stays_quiet() {
        let mut det = SimulatedDetector::new(SimulatedDetectorConfig {
            counts_per_minute: 0.0,
            sample_period: Duration::ZERO,
            noise_floor: 50,
            seed: Some(1),
            ..Default::default()
        });
        assert!((0..1_000).all(|_| det.read_sample() <= 50));
    }

    #[test]
    fn vanishing_or_nan_rate_stays_quiet() {
        for cpm in [1e-20, f64::MIN_POSITIVE, f64::NAN] {
            let mut det = SimulatedDetector::new(SimulatedDetectorConfig {
                counts_per_minute: cpm,
                sample_period: Duration::ZERO,
                noise_floor: 50,
                seed: Some(3),
                ..Default::default()
            });
            assert!((0..1_000).all(|_| det.read_sample() <= 50), "cpm={cpm}");
        }
    }
}
