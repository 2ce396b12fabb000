use std::sync::Arc;
use std::time::Duration;

use decayrng_core::{EngineConfig, EntropyEngine, SimulatedDetector, SimulatedDetectorConfig};
use decayrng_server::ServerConfig;

pub struct ServeCommandConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub detector: SimulatedDetectorConfig,
    pub warmup: Duration,
    pub restart_attempts: u32,
    pub restart_delay: Duration,
    pub stats_interval: Option<Duration>,
    pub exit_on_fatal: bool,
}

pub fn run(cfg: ServeCommandConfig) {
    let base = format!("{}:{}", cfg.server.host, cfg.server.port);

    println!("☢️  decayrng server v{}", decayrng_core::VERSION);
    println!("   tcp://{base}");
    println!(
        "   simulated detector: ~{} cpm, pulse > {}, baseline <= {}",
        cfg.detector.counts_per_minute, cfg.engine.pulse_threshold, cfg.engine.baseline_threshold
    );
    println!();
    println!("   Commands (3 bytes each, may be concatenated):");
    println!("     req    <value>:<source_counter>:<available>");
    println!("     sta    cpm:<last>:<avg>:loop:<min>:<max>:<below>:<above>");
    println!("     end    close the connection");
    println!();
    println!("   Try: decayrng client --port {} --requests 3 --stats", cfg.server.port);
    println!();

    let engine = Arc::new(EntropyEngine::new(cfg.engine));
    if let Err(e) = engine.start_detection(SimulatedDetector::new(cfg.detector)) {
        fatal(&e.to_string(), cfg.exit_on_fatal);
    }

    if let Some(interval) = cfg.stats_interval {
        let engine = Arc::clone(&engine);
        let spawned = std::thread::Builder::new()
            .name("stats".into())
            .spawn(move || {
                loop {
                    std::thread::sleep(interval);
                    log::info!(
                        "{} pulses={} queued={}",
                        engine.render_stats(),
                        engine.detected_pulses(),
                        engine.available_count()
                    );
                }
            });
        if let Err(e) = spawned {
            log::warn!("stats reporter not started: {e}");
        }
    }

    if !cfg.warmup.is_zero() {
        log::info!("warming up for {:?}", cfg.warmup);
        std::thread::sleep(cfg.warmup);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fatal(&format!("tokio runtime: {e}"), cfg.exit_on_fatal),
    };

    let mut failures = 0u32;
    loop {
        match rt.block_on(decayrng_server::service(&cfg.server, Arc::clone(&engine))) {
            Ok(never) => match never {},
            Err(e) => {
                failures += 1;
                log::error!("network loop exited: {e}");
                if failures > cfg.restart_attempts {
                    fatal(
                        &format!("network unavailable after {failures} attempts"),
                        cfg.exit_on_fatal,
                    );
                }
                log::info!(
                    "restarting network in {:?} (attempt {failures}/{})",
                    cfg.restart_delay,
                    cfg.restart_attempts
                );
                std::thread::sleep(cfg.restart_delay);
            }
        }
    }
}

fn fatal(msg: &str, exit_on_fatal: bool) -> ! {
    if exit_on_fatal {
        log::error!("fatal: {msg}");
        eprintln!("Error: {msg}");
        std::process::exit(1);
    }
    decayrng_core::halt(msg)
}
