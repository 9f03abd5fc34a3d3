//! `pi-service`: Monte-Carlo π estimation over HTTP.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────┐
//!   HTTP ────▶ │    server    │── request (validate) ──┐
//!              └──────────────┘                        │
//!        ┌──────────────────────┬──────────────────────┤
//!        ▼                      ▼                      ▼
//!   simulation             aggregate                usage
//!   (sum of hits)          (filter + mean)          (locked load/+1/save)
//!        │                      │
//!        └──────── pool ────────┘
//!                               │
//!                            legacy (TCP / UDP round-trip)
//! ```
//!
//! Each module has a single responsibility:
//! - [`request`]: credential and field validation into typed requests
//! - [`pool`]: bounded join-all fan-out onto worker threads
//! - [`simulation`]: sampler and simulation coordinator
//! - [`legacy`]: blocking client for the legacy estimator
//! - [`aggregate`]: parallel legacy queries reduced to one mean
//! - [`usage`]: per-user counters behind one lock, with pluggable storage
//! - [`error`]: service error type and its HTTP mapping
//! - [`server`]: axum routes, handlers and server lifecycle
//! - [`config`]: service configuration and wiring

pub mod aggregate;
pub mod config;
pub mod error;
pub mod legacy;
pub mod pool;
pub mod request;
pub mod server;
pub mod simulation;
pub mod usage;

pub use aggregate::{AggregationResult, Aggregator};
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use legacy::{LegacyClient, LegacyError};
pub use request::{Concurrency, Credentials, LegacyQueryRequest, Rejection, SimulationRequest, Transport};
pub use server::{create_router, AppState, Server};
pub use simulation::{SimulationCoordinator, SimulationResult};
pub use usage::{CounterStorage, FileStorage, MemoryStorage, UsageCounters, UsageStore};

use std::time::Duration;

/// Serialise a duration as fractional seconds.
pub(crate) fn serialize_secs<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
