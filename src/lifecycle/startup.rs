//! Startup orchestration.
//!
//! # Responsibilities
//! - Announce what is being relayed where
//! - Start optional background services (metrics endpoint)
//! - Bind the listener last, so traffic only arrives when ready
//!
//! # Design Decisions
//! - Fail fast: a bind failure is fatal and reported with a diagnostic

use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::config::RelayConfig;
use crate::net::listener::{self, ListenerError};
use crate::observability::metrics;

/// Log the startup banner.
pub fn announce(config: &RelayConfig) {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address(),
        "lan-relay v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!(
        "Forwarding http://{} to http://{}",
        config.listener.bind_address,
        config.backend.address()
    );

    if !config.backend.is_loopback() {
        tracing::warn!(
            backend_host = %config.backend.host,
            "Backend host is not a loopback address"
        );
    }
}

/// Start the Prometheus endpoint when enabled. Failures are logged, not fatal.
pub fn start_metrics(config: &RelayConfig) {
    if !config.observability.metrics_enabled {
        return;
    }
    match config.observability.metrics_address.parse::<SocketAddr>() {
        Ok(addr) => {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to start metrics endpoint");
            }
        }
        Err(_) => tracing::error!(
            metrics_address = %config.observability.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}

/// Bind the network-facing listener.
pub async fn bind_listener(config: &RelayConfig) -> Result<TcpListener, ListenerError> {
    listener::bind(&config.listener).await
}
