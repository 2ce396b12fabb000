use decayrng_core::clock::micros_to_millis;
use decayrng_core::{
    Clock, EngineConfig, EntropyEngine, MonotonicClock, SimulatedDetector, SimulatedDetectorConfig,
};

/// Run the detection loop in-process for a fixed number of iterations and
/// print the resulting statistics.
pub fn run(
    engine_cfg: EngineConfig,
    detector_cfg: SimulatedDetectorConfig,
    iterations: u64,
    show: usize,
    json: bool,
) {
    let engine = EntropyEngine::new(engine_cfg);
    let mut detector = SimulatedDetector::new(detector_cfg);
    let wall = MonotonicClock::new();
    for _ in 0..iterations {
        engine.step(&mut detector);
    }
    let elapsed_ms = micros_to_millis(wall.now_us());

    let snapshot = engine.stats_snapshot();
    let entries: Vec<_> = (0..show.min(snapshot.available))
        .map(|_| engine.pop_entropy())
        .collect();

    if json {
        let out = serde_json::json!({
            "stats": snapshot,
            "line": snapshot.to_string(),
            "elapsed_ms": elapsed_ms,
            "entries": entries,
        });
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }

    println!("{snapshot}");
    println!(
        "iterations={} pulses={} queued={} registry={} elapsed={}ms",
        iterations,
        snapshot.detected_pulses,
        snapshot.available,
        snapshot.registry_counter,
        elapsed_ms
    );
    for e in &entries {
        println!("{}:{}", e.value, e.source_counter);
    }
}
