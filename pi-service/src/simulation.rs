//! Local Monte-Carlo estimation of π.
//!
//! Points are drawn uniformly from the unit square; the fraction landing
//! strictly inside the quarter circle approaches π/4.
//!
//! The requested budget is split into `concurrency` equal shares by integer
//! division.  The remainder is not simulated, yet the estimate still divides
//! by the *requested* count, so e.g. 1001 simulations over 8 workers run 1000
//! trials and are scored out of 1001.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::pool::{self, PoolError};
use crate::request::{Concurrency, SimulationRequest};

/// Outcome of one simulation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub simulations: u64,
    pub concurrency: Concurrency,
    #[serde(rename = "pi")]
    pub estimate: f64,
    #[serde(rename = "execution_time", serialize_with = "crate::serialize_secs")]
    pub elapsed: Duration,
}

/// Run `trials` samples and count the hits inside the unit circle.
pub fn sample_hits<R: Rng + ?Sized>(rng: &mut R, trials: u64) -> u64 {
    let mut hits = 0;
    for _ in 0..trials {
        let x: f64 = rng.random();
        let y: f64 = rng.random();
        if x * x + y * y < 1.0 {
            hits += 1;
        }
    }
    hits
}

/// Splits a simulation budget across parallel samplers.
#[derive(Debug, Clone, Default)]
pub struct SimulationCoordinator {
    seed: Option<u64>,
}

impl SimulationCoordinator {
    /// Coordinator drawing from each worker's thread-local RNG.
    pub fn new() -> Self {
        Self { seed: None }
    }

    /// Reproducible coordinator: share `i` uses a `StdRng` seeded with
    /// `seed + i`.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Estimate π for a validated request.  Blocks until every share is done.
    pub fn estimate(&self, request: &SimulationRequest) -> Result<SimulationResult, PoolError> {
        let start = Instant::now();
        let workers = request.concurrency.get();
        let share = request.simulations / workers as u64;

        let hits: u64 = pool::join_all(workers, |unit| match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(unit as u64));
                sample_hits(&mut rng, share)
            }
            None => sample_hits(&mut rand::rng(), share),
        })?
        .into_iter()
        .sum();

        let estimate = 4.0 * hits as f64 / request.simulations as f64;
        let elapsed = start.elapsed();
        log::debug!(
            "simulated {} x {} trials: {} hits, estimate {:.6} in {:?}",
            workers,
            share,
            hits,
            estimate,
            elapsed
        );

        Ok(SimulationResult {
            simulations: request.simulations,
            concurrency: request.concurrency,
            estimate,
            elapsed,
        })
    }
}
