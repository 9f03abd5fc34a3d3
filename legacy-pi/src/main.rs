//! Entry point for `legacy-pi`.
//!
//! Parses CLI arguments and runs the emulator until Ctrl-C.  All protocol
//! work lives in the library; `main.rs` owns only process setup (logging,
//! signal handling, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use legacy_pi::{EmulatorConfig, NoiseModel, DEFAULT_PORT};

/// Noisy legacy π estimator served over TCP and UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Host to bind.
    #[arg(default_value = "0.0.0.0")]
    host: String,
    /// Port shared by the TCP and UDP listeners.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Delay before each reply, in milliseconds.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
    /// Half-width of the random offset added to π.
    #[arg(long, default_value_t = 0.05, value_parser = non_negative)]
    perturbation: f64,
    /// Probability that one character of a reply is replaced by a letter.
    #[arg(long, default_value_t = 0.5, value_parser = probability)]
    corruption_rate: f64,
}

/// A finite number `>= 0`.
fn non_negative(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("`{s}` is not a finite non-negative number")),
    }
}

/// A number in `[0, 1]`.
fn probability(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(format!("`{s}` is not a probability in [0, 1]")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let bind: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;

    let handle = legacy_pi::start(EmulatorConfig {
        bind,
        delay: Duration::from_millis(cli.delay_ms),
        noise: NoiseModel {
            perturbation: cli.perturbation,
            corruption_rate: cli.corruption_rate,
        },
    })
    .await?;

    log::info!("Press Ctrl-C to terminate the server");
    tokio::signal::ctrl_c().await?;
    log::info!("Exiting");
    handle.abort();
    Ok(())
}
