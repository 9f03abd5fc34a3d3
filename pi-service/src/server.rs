//! HTTP boundary: routes, handlers and the server lifecycle.
//!
//! | Route              | Operation                          |
//! |--------------------|------------------------------------|
//! | `POST /pi`         | local Monte-Carlo estimate         |
//! | `POST /legacy_pi`  | aggregated legacy-estimator query  |
//! | `POST /statistics` | record a hit and return all counts |
//!
//! Bodies are JSON objects.  A body that is not a JSON object is read as an
//! empty object, which then fails the credential check like any other
//! request without credentials.
//!
//! Coordinators block (worker threads, socket round-trips, file I/O), so each
//! handler moves its work onto tokio's blocking pool.  The reported
//! `execution_time` runs from handler entry until the hit is recorded.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::aggregate::{AggregationResult, Aggregator};
use crate::error::ServiceError;
use crate::request::{self, Fields};
use crate::simulation::{SimulationCoordinator, SimulationResult};
use crate::usage::{UsageCounters, UsageStore};

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Shared state for handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub simulator: Arc<SimulationCoordinator>,
    pub aggregator: Arc<Aggregator>,
    pub usage: Arc<UsageStore>,
}

impl AppState {
    pub fn new(simulator: SimulationCoordinator, aggregator: Aggregator, usage: UsageStore) -> Self {
        Self {
            simulator: Arc::new(simulator),
            aggregator: Arc::new(aggregator),
            usage: Arc::new(usage),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Routes & handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Create the router with every route.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/pi", post(pi_handler))
        .route("/legacy_pi", post(legacy_pi_handler))
        .route("/statistics", post(statistics_handler))
        .with_state(state)
}

/// Read a request body as a JSON object, falling back to an empty one.
pub fn parse_fields(body: &[u8]) -> Fields {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields,
        _ => Fields::new(),
    }
}

/// Handler for `POST /pi`.
pub async fn pi_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SimulationResult>, ServiceError> {
    let start = Instant::now();
    let fields = parse_fields(&body);
    let (credentials, request) = request::simulation(&fields)?;
    log::info!(
        "pi request from {}: {} simulations, concurrency {}",
        credentials.username(),
        request.simulations,
        request.concurrency.get()
    );

    let mut result = tokio::task::spawn_blocking(move || -> Result<_, ServiceError> {
        let result = state.simulator.estimate(&request)?;
        state.usage.record(credentials.username())?;
        Ok(result)
    })
    .await??;
    result.elapsed = start.elapsed();
    Ok(Json(result))
}

/// Handler for `POST /legacy_pi`.
pub async fn legacy_pi_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AggregationResult>, ServiceError> {
    let start = Instant::now();
    let fields = parse_fields(&body);
    let (credentials, request) = request::legacy_query(&fields)?;
    log::info!(
        "legacy_pi request from {}: {}, concurrency {}",
        credentials.username(),
        request.transport,
        request.concurrency.get()
    );

    let mut result = tokio::task::spawn_blocking(move || -> Result<_, ServiceError> {
        let result = state.aggregator.estimate(&request)?;
        state.usage.record(credentials.username())?;
        Ok(result)
    })
    .await??;
    result.elapsed = start.elapsed();
    Ok(Json(result))
}

/// Handler for `POST /statistics`.
pub async fn statistics_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UsageCounters>, ServiceError> {
    let fields = parse_fields(&body);
    let credentials = request::usage(&fields)?;

    let counters =
        tokio::task::spawn_blocking(move || state.usage.record(credentials.username())).await??;
    Ok(Json(counters))
}

// ═══════════════════════════════════════════════════════════════════════════
// Server
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),
}

/// Handle for a running server.
pub struct ServerHandle {
    /// Address the listener is bound to.
    pub local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Abort the server.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the server to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// HTTP server for the estimation service.
pub struct Server {
    listen_addr: SocketAddr,
    state: AppState,
}

impl Server {
    pub fn new(listen_addr: SocketAddr, state: AppState) -> Self {
        Self { listen_addr, state }
    }

    /// Bind and serve in a background task.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("pi service listening on {local_addr}");

        let router = create_router(self.state);
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                log::error!("server error: {e}");
            }
        });

        Ok(ServerHandle { local_addr, task })
    }

    /// Start and serve until the task ends.
    pub async fn serve(self) -> Result<(), ServerError> {
        let handle = self.start().await?;
        let _ = handle.join().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fields_accepts_objects() {
        let fields = parse_fields(br#"{"username": "1111", "simulations": 100}"#);
        assert_eq!(fields.get("username").and_then(Value::as_str), Some("1111"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn parse_fields_falls_back_to_empty() {
        assert!(parse_fields(b"").is_empty());
        assert!(parse_fields(b"not json").is_empty());
        assert!(parse_fields(b"[1, 2, 3]").is_empty());
        assert!(parse_fields(b"\"1111\"").is_empty());
    }

    #[test]
    fn default_listen_addr_parses() {
        let addr: SocketAddr = DEFAULT_LISTEN_ADDR.parse().unwrap();
        assert_eq!(addr.port(), 5000);
    }
}
