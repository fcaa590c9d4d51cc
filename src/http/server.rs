//! HTTP server setup and dispatch.
//!
//! # Responsibilities
//! - Create the Axum Router with the catch-all relay handler
//! - Wire up middleware (tracing with request IDs)
//! - Classify each request and dispatch it to the plain or upgrade path
//! - Drain live tunnels on shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::{LimitsConfig, RelayConfig, TimeoutConfig};
use crate::http::request::request_span;
use crate::http::response::bad_gateway;
use crate::http::{forward, upgrade};
use crate::net::{BackendConnector, TunnelTracker};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub connector: BackendConnector,
    pub timeouts: TimeoutConfig,
    pub limits: LimitsConfig,
    pub tunnels: TunnelTracker,
}

/// HTTP server for the relay.
pub struct RelayServer {
    router: Router,
    config: RelayConfig,
    tunnels: TunnelTracker,
}

impl RelayServer {
    /// Create a new relay server with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        let tunnels = TunnelTracker::new();
        let state = AppState {
            connector: BackendConnector::new(&config.backend, config.timeouts.connect()),
            timeouts: config.timeouts.clone(),
            limits: config.limits.clone(),
            tunnels: tunnels.clone(),
        };

        let router = Self::build_router(state);
        Self {
            router,
            config,
            tunnels,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(relay_handler))
            .route("/{*path}", any(relay_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
    }

    /// Run the server until `shutdown` fires, then drain live tunnels.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.backend.address(),
            "Relay server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, no longer accepting connections");
            })
            .await?;

        let remaining = self
            .tunnels
            .wait_idle(self.config.timeouts.shutdown_grace())
            .await;
        if remaining > 0 {
            tracing::warn!(remaining, "Shutdown grace period elapsed with tunnels still open");
        }

        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Handle on the live tunnel count.
    pub fn tunnels(&self) -> &TunnelTracker {
        &self.tunnels
    }
}

/// Catch-all handler: upgrade requests are tunnelled, everything else relayed.
async fn relay_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    if upgrade::is_upgrade_request(request.headers()) {
        tracing::debug!(peer = %peer, "Upgrade request");
        return upgrade::relay_upgrade(&state, request).await;
    }

    let start_time = Instant::now();
    let method = request.method().to_string();
    tracing::debug!(peer = %peer, "Relaying request");

    match forward::relay_request(&state, request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            response
        }
        Err(e) => {
            tracing::warn!(backend = %state.connector.addr(), error = %e, "Relay failed");
            metrics::record_backend_error(e.kind());
            metrics::record_request(&method, 502, start_time);
            bad_gateway(format!("Proxy error: {}", e))
        }
    }
}
