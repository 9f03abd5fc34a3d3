//! Entry point for `pi-service`.
//!
//! Parses CLI arguments and dispatches into one of the subcommands.  All
//! estimation work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pi_service::legacy::{DEFAULT_LEGACY_ADDR, QUERY_TIMEOUT};
use pi_service::server::DEFAULT_LISTEN_ADDR;
use pi_service::usage::DEFAULT_STATS_FILE;
use pi_service::{
    Aggregator, Concurrency, LegacyQueryRequest, Server, ServiceConfig, SimulationRequest,
    Transport, UsageStore,
};

/// Monte-Carlo π estimation service.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the HTTP service.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: SocketAddr,
        #[command(flatten)]
        legacy: LegacyArgs,
        /// Counters file.
        #[arg(long, default_value = DEFAULT_STATS_FILE, conflicts_with = "in_memory")]
        stats_file: PathBuf,
        /// Keep usage counters in memory instead of a file.
        #[arg(long)]
        in_memory: bool,
        /// Base seed for reproducible simulations.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run one local simulation and print the result as JSON.
    Estimate {
        /// Number of samples (100..=100000000).
        #[arg(short, long)]
        simulations: u64,
        /// Parallel workers (1..=8).
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,
        /// Base seed for reproducible simulations.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Query the legacy estimator and print the aggregate as JSON.
    Legacy {
        /// `tcp` or `udp`.
        #[arg(short, long, default_value = "tcp")]
        transport: Transport,
        /// Parallel queries (1..=8).
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,
        #[command(flatten)]
        legacy: LegacyArgs,
    },
    /// Print the persisted usage counters.
    Stats {
        /// Counters file.
        #[arg(long, default_value = DEFAULT_STATS_FILE)]
        stats_file: PathBuf,
    },
}

#[derive(Args)]
struct LegacyArgs {
    /// Legacy estimator address.
    #[arg(long, default_value = DEFAULT_LEGACY_ADDR)]
    legacy_addr: String,
    /// Timeout for one legacy round-trip, in milliseconds.
    #[arg(long, default_value_t = QUERY_TIMEOUT.as_millis() as u64)]
    legacy_timeout_ms: u64,
}

fn concurrency(value: usize) -> Result<Concurrency> {
    Concurrency::new(value).with_context(|| {
        format!(
            "concurrency must be between {} and {}",
            Concurrency::MIN,
            Concurrency::MAX
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Serve {
            listen,
            legacy,
            stats_file,
            in_memory,
            seed,
        } => {
            let config = ServiceConfig {
                listen_addr: listen,
                legacy_addr: legacy.legacy_addr,
                legacy_timeout: Duration::from_millis(legacy.legacy_timeout_ms),
                stats_file: (!in_memory).then_some(stats_file),
                seed,
            };
            let state = config.build_state()?;
            let handle = Server::new(config.listen_addr, state).start().await?;

            tokio::signal::ctrl_c().await?;
            log::info!("shutting down");
            handle.abort();
        }
        Mode::Estimate {
            simulations,
            concurrency: workers,
            seed,
        } => {
            anyhow::ensure!(
                (pi_service::request::MIN_SIMULATIONS..=pi_service::request::MAX_SIMULATIONS)
                    .contains(&simulations),
                "invalid field simulations"
            );
            let request = SimulationRequest {
                simulations,
                concurrency: concurrency(workers)?,
            };
            let simulator = ServiceConfig {
                seed,
                ..ServiceConfig::default()
            }
            .simulator();
            let result = tokio::task::spawn_blocking(move || simulator.estimate(&request)).await??;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Mode::Legacy {
            transport,
            concurrency: workers,
            legacy,
        } => {
            let request = LegacyQueryRequest {
                transport,
                concurrency: concurrency(workers)?,
            };
            let config = ServiceConfig {
                legacy_addr: legacy.legacy_addr,
                legacy_timeout: Duration::from_millis(legacy.legacy_timeout_ms),
                ..ServiceConfig::default()
            };
            let aggregator = Aggregator::new(config.legacy_client()?);
            let result = tokio::task::spawn_blocking(move || aggregator.estimate(&request)).await??;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Mode::Stats { stats_file } => {
            let counters = UsageStore::file(stats_file).snapshot()?;
            for (user, count) in counters {
                println!("{user} {count}");
            }
        }
    }

    Ok(())
}
