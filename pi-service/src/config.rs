//! Service configuration and wiring.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregate::Aggregator;
use crate::legacy::{LegacyClient, LegacyError, DEFAULT_LEGACY_ADDR, QUERY_TIMEOUT};
use crate::server::AppState;
use crate::simulation::SimulationCoordinator;
use crate::usage::{UsageStore, DEFAULT_STATS_FILE};

/// Everything needed to assemble a running service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Legacy estimator address (`host:port`).
    pub legacy_addr: String,
    /// Timeout for one legacy round-trip.
    pub legacy_timeout: Duration,
    /// Counters file; `None` keeps counters in memory.
    pub stats_file: Option<PathBuf>,
    /// Base seed for reproducible simulations.
    pub seed: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            legacy_addr: DEFAULT_LEGACY_ADDR.to_string(),
            legacy_timeout: QUERY_TIMEOUT,
            stats_file: Some(PathBuf::from(DEFAULT_STATS_FILE)),
            seed: None,
        }
    }
}

impl ServiceConfig {
    pub fn simulator(&self) -> SimulationCoordinator {
        match self.seed {
            Some(seed) => SimulationCoordinator::with_seed(seed),
            None => SimulationCoordinator::new(),
        }
    }

    pub fn legacy_client(&self) -> Result<LegacyClient, LegacyError> {
        Ok(LegacyClient::new(&self.legacy_addr)?.timeout(self.legacy_timeout))
    }

    pub fn usage_store(&self) -> UsageStore {
        match &self.stats_file {
            Some(path) => UsageStore::file(path.clone()),
            None => UsageStore::in_memory(),
        }
    }

    /// Build handler state from this configuration.
    pub fn build_state(&self) -> Result<AppState, LegacyError> {
        Ok(AppState::new(
            self.simulator(),
            Aggregator::new(self.legacy_client()?),
            self.usage_store(),
        ))
    }
}
