//! CLI for decayrng: random numbers from radioactive decay.

mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "decayrng")]
#[command(about = "decayrng — random numbers from radioactive decay")]
#[command(version = decayrng_core::VERSION)]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection loop and serve entropy over TCP (one client at a time)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "6666")]
        port: u16,

        /// Sample level above which a pulse is detected
        #[arg(long, default_value = "2500")]
        pulse_threshold: u16,

        /// Sample level at or below which the signal is back at baseline
        #[arg(long, default_value = "100")]
        baseline_threshold: u16,

        /// Maximum queued entries (oldest dropped on overflow)
        #[arg(long, default_value = "10240")]
        queue_capacity: usize,

        /// Mean pulse rate of the simulated detector (counts per minute)
        #[arg(long, default_value = "30")]
        cpm: f64,

        /// Simulated conversion time per sample in microseconds
        #[arg(long, default_value = "20")]
        sample_period_us: u64,

        /// Seed for the simulated detector (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Delay between starting detection and opening the listener
        #[arg(long, default_value = "0")]
        warmup_ms: u64,

        /// How many times to restart the network loop after a setup failure
        #[arg(long, default_value = "3")]
        restart_attempts: u32,

        /// Delay between network restarts
        #[arg(long, default_value = "10000")]
        restart_delay_ms: u64,

        /// Log the stats line every N seconds (0 = off)
        #[arg(long, default_value = "0")]
        stats_interval_secs: u64,

        /// Exit with status 1 on fatal errors instead of idling forever
        #[arg(long)]
        exit_on_fatal: bool,
    },

    /// Connect to a server, request entropy, then disconnect
    Client {
        /// Server address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port
        #[arg(long, default_value = "6666")]
        port: u16,

        /// Number of `req` commands to send
        #[arg(long, default_value = "3")]
        requests: usize,

        /// Also send `sta` and print the statistics line
        #[arg(long)]
        stats: bool,
    },

    /// Run the detection loop locally for a fixed number of iterations
    Stats {
        /// Detection loop iterations
        #[arg(long, default_value = "200000")]
        iterations: u64,

        /// Mean pulse rate of the simulated detector (counts per minute)
        #[arg(long, default_value = "60000")]
        cpm: f64,

        /// Simulated conversion time per sample in microseconds
        #[arg(long, default_value = "0")]
        sample_period_us: u64,

        /// Seed for the simulated detector (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the first N queued entries
        #[arg(long, default_value = "0")]
        show: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            pulse_threshold,
            baseline_threshold,
            queue_capacity,
            cpm,
            sample_period_us,
            seed,
            warmup_ms,
            restart_attempts,
            restart_delay_ms,
            stats_interval_secs,
            exit_on_fatal,
        } => commands::serve::run(commands::serve::ServeCommandConfig {
            server: decayrng_server::ServerConfig { host, port },
            engine: commands::engine_config(pulse_threshold, baseline_threshold, queue_capacity),
            detector: commands::detector_config(cpm, sample_period_us, seed),
            warmup: Duration::from_millis(warmup_ms),
            restart_attempts,
            restart_delay: Duration::from_millis(restart_delay_ms),
            stats_interval: (stats_interval_secs > 0)
                .then(|| Duration::from_secs(stats_interval_secs)),
            exit_on_fatal,
        }),
        Commands::Client {
            host,
            port,
            requests,
            stats,
        } => {
            if let Err(e) = commands::client::run(&host, port, requests, stats) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Stats {
            iterations,
            cpm,
            sample_period_us,
            seed,
            show,
            json,
        } => commands::stats::run(
            decayrng_core::EngineConfig::default(),
            commands::detector_config(cpm, sample_period_us, seed),
            iterations,
            show,
            json,
        ),
    }
}
