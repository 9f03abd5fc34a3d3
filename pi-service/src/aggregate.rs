//! Consensus over several noisy legacy replies.
//!
//! One request fans out `concurrency` round-trips at once, waits for all of
//! them, keeps the replies that read as a finite real number and averages
//! those.  Failed round-trips and unparsable replies are dropped silently;
//! only the count of survivors is reported.  With no survivors the estimate
//! is exactly `0.0`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::legacy::{LegacyClient, LegacyError};
use crate::pool::{self, PoolError};
use crate::request::{Concurrency, LegacyQueryRequest, Transport};

/// One legacy round-trip.  Production uses [`LegacyClient::query`]; tests
/// swap in canned replies.
pub type QueryFn = dyn Fn(Transport) -> Result<String, LegacyError> + Send + Sync;

/// Outcome of one aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    #[serde(rename = "protocol")]
    pub transport: Transport,
    pub concurrency: Concurrency,
    #[serde(rename = "num_valid_results")]
    pub valid_count: usize,
    #[serde(rename = "pi")]
    pub estimate: f64,
    #[serde(rename = "execution_time", serialize_with = "crate::serialize_secs")]
    pub elapsed: Duration,
}

/// Parse one reply.  Surrounding whitespace is ignored; anything else must be
/// a real-number literal (sign, decimal point, exponent allowed).  Infinite
/// and NaN results are rejected so the mean stays a finite number.
pub fn parse_reply(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Arithmetic mean, or `0.0` for no values.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Fans requests out to the legacy estimator and reduces the replies.
#[derive(Clone)]
pub struct Aggregator {
    backend: Arc<QueryFn>,
}

impl Aggregator {
    pub fn new(client: LegacyClient) -> Self {
        Self {
            backend: Arc::new(move |transport: Transport| client.query(transport)),
        }
    }

    /// Aggregator with a custom query backend.
    pub fn with_backend(backend: Box<QueryFn>) -> Self {
        Self {
            backend: Arc::from(backend),
        }
    }

    /// Query the estimator `concurrency` times in parallel and average the
    /// valid replies.  Only a pool failure is an error.
    pub fn estimate(&self, request: &LegacyQueryRequest) -> Result<AggregationResult, PoolError> {
        let start = Instant::now();
        let transport = request.transport;

        let replies = pool::join_all(request.concurrency.get(), |unit| {
            match (self.backend)(transport) {
                Ok(text) => {
                    let value = parse_reply(&text);
                    if value.is_none() {
                        log::debug!("{transport} query {unit}: discarding reply {text:?}");
                    }
                    value
                }
                Err(e) => {
                    log::debug!("{transport} query {unit} failed: {e}");
                    None
                }
            }
        })?;

        let valid: Vec<f64> = replies.into_iter().flatten().collect();
        let estimate = mean(&valid);
        let elapsed = start.elapsed();
        log::info!(
            "{} legacy queries over {}: {} valid, estimate {:.6} in {:?}",
            request.concurrency.get(),
            transport,
            valid.len(),
            estimate,
            elapsed
        );

        Ok(AggregationResult {
            transport,
            concurrency: request.concurrency,
            valid_count: valid.len(),
            estimate,
            elapsed,
        })
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator").finish_non_exhaustive()
    }
}
