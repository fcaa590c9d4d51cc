//! Request handling and transformation.
//!
//! # Responsibilities
//! - Attach a request ID to every request span (client-supplied or UUID v4)
//! - Prepare the outbound header set for plain exchanges
//! - Determine the declared body length
//!
//! # Design Decisions
//! - The request ID lives in the tracing span only; the forwarded request is
//!   not rewritten beyond hop-by-hop stripping
//! - `Host` is endpoint-specific; the backend authority replaces it

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tracing::Span;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request headers never copied onto the outbound plain request.
pub const STRIPPED_REQUEST_HEADERS: [HeaderName; 3] =
    [header::HOST, header::CONNECTION, header::TRANSFER_ENCODING];

/// The client's `x-request-id`, or a fresh UUID v4.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Span wrapping the handling of one inbound request.
pub fn request_span<B>(request: &Request<B>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Copy of `inbound` without the hop-by-hop and endpoint-specific headers.
pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if !STRIPPED_REQUEST_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// The `Host` value announced to the backend.
pub fn backend_host(addr: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(addr).ok()
}

/// Body length declared by `Content-Length`, if any.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
