//! Protocol upgrade path.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Forward the handshake to the backend and relay its answer
//! - On `101`, splice the upgraded client connection with the backend one
//!
//! # Data Flow
//! ```text
//! Client ──upgrade request──▶ Relay ──request head (verbatim)──▶ Backend
//! Client ◀────── 101 ─────── Relay ◀─────── response head ────── Backend
//! Client ◀═══════ raw bytes ═══════ splice ═══════ raw bytes ═══════▶ Backend
//! ```
//!
//! # Design Decisions
//! - Errors before the 101 is sent become 502 responses; after it, the tunnel
//!   is simply closed (nothing may be injected into the upgraded stream)

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Request},
    response::Response,
};
use bytes::Bytes;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::Instrument;

use crate::http::handshake::{forward_handshake, read_refusal_body};
use crate::http::response::bad_gateway;
use crate::http::server::AppState;
use crate::net::{splice, TunnelGuard};
use crate::observability::metrics;

/// Protocol token the relay upgrades for.
pub const WEBSOCKET: &str = "websocket";

/// Whether the request asks to switch to WebSocket.
///
/// Both `Connection` must list `upgrade` and `Upgrade` must name `websocket`;
/// either one alone classifies the request as a plain exchange.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    has_token(headers, &header::CONNECTION, "upgrade")
        && has_token(headers, &header::UPGRADE, WEBSOCKET)
}

fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// Handle an upgrade request end to end.
///
/// A handshake that does not yield a complete response head (timeout, early
/// close, oversized or malformed head) is answered with `502 WebSocket proxy
/// error`. The partial bytes are not forwarded: hyper owns the client
/// connection and only accepts a complete response.
pub async fn relay_upgrade(state: &AppState, mut request: Request<Body>) -> Response {
    let on_upgrade = hyper::upgrade::on(&mut request);
    let (parts, _body) = request.into_parts();

    let mut backend = match state.connector.connect().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(backend = %state.connector.addr(), error = %e, "Backend unreachable for upgrade");
            metrics::record_backend_error(e.kind());
            metrics::record_upgrade("unreachable");
            return bad_gateway(format!("WebSocket proxy error: {}", e));
        }
    };

    let deadline = Instant::now() + state.timeouts.handshake();
    let mut handshake = match forward_handshake(&mut backend, &parts, deadline, &state.limits).await {
        Ok(handshake) => handshake,
        Err(e) => {
            tracing::warn!(error = %e, "Upgrade handshake failed");
            metrics::record_backend_error(e.kind());
            metrics::record_upgrade("failed");
            return bad_gateway(format!("WebSocket proxy error: {}", e));
        }
    };

    if !handshake.is_switching_protocols() {
        tracing::info!(status = %handshake.status, "Backend refused upgrade");
        metrics::record_upgrade("refused");
        let body = read_refusal_body(
            &mut backend,
            &mut handshake,
            deadline,
            state.limits.max_body_bytes,
            state.limits.relay_chunk_size,
        )
        .await;
        drop(backend);
        return handshake.into_refusal_response(body);
    }

    metrics::record_upgrade("switched");
    let (response, trailing) = handshake.into_switching_response();

    let guard = state.tunnels.track();
    let span = tracing::info_span!("tunnel", tunnel_id = %guard.id());
    let chunk_size = state.limits.relay_chunk_size;
    tokio::spawn(run_tunnel(on_upgrade, backend, trailing, chunk_size, guard).instrument(span));

    response
}

async fn run_tunnel(
    on_upgrade: OnUpgrade,
    backend: TcpStream,
    trailing: Bytes,
    chunk_size: usize,
    _guard: TunnelGuard,
) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            tracing::warn!(error = %e, "Client upgrade failed");
            return;
        }
    };
    let mut client = TokioIo::new(upgraded);

    if !trailing.is_empty() {
        if let Err(e) = client.write_all(&trailing).await {
            tracing::debug!(error = %e, "Failed to deliver early backend bytes");
            return;
        }
    }

    tracing::info!("Tunnel open");
    let stats = splice(client, backend, chunk_size).await;
    tracing::info!(
        client_to_backend = stats.client_to_backend,
        backend_to_client = stats.backend_to_client,
        "Tunnel closed"
    );
}
