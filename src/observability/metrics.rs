//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): plain exchanges by method, status
//! - `relay_request_duration_seconds` (histogram): plain exchange latency
//! - `relay_backend_errors_total` (counter): backend failures by kind
//! - `relay_upgrades_total` (counter): upgrade attempts by outcome
//! - `relay_active_tunnels` (gauge): live upgraded connections
//! - `relay_tunnel_bytes_total` (counter): spliced bytes by direction

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed plain exchange.
pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("relay_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

/// Record a failure talking to the backend.
pub fn record_backend_error(kind: &'static str) {
    ::metrics::counter!("relay_backend_errors_total", "kind" => kind).increment(1);
}

/// Record the outcome of an upgrade handshake.
pub fn record_upgrade(outcome: &'static str) {
    ::metrics::counter!("relay_upgrades_total", "outcome" => outcome).increment(1);
}

pub fn tunnel_opened() {
    ::metrics::gauge!("relay_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    ::metrics::gauge!("relay_active_tunnels").decrement(1.0);
}

/// Record bytes copied by one direction of a tunnel.
pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    ::metrics::counter!("relay_tunnel_bytes_total", "direction" => direction).increment(bytes);
}
