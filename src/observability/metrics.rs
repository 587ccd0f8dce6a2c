//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define middleware chain metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `middleware_chain_runs_total` (counter): chain runs by outcome
//! - `middleware_chain_duration_seconds` (histogram): time from first entry to settlement
//! - `middleware_chain_entries` (histogram): matching entries per run
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Only requests with at least one matching entry are recorded
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Record one settled chain run.
pub fn record_chain(outcome: &'static str, entries: usize, started: Instant) {
    counter!("middleware_chain_runs_total", "outcome" => outcome).increment(1);
    histogram!("middleware_chain_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
    histogram!("middleware_chain_entries").record(entries as f64);
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}
