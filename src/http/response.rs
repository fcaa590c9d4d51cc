//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip headers invalidated by buffering before relaying a backend response
//! - Map relay failures to 502 Bad Gateway with a readable message
//!
//! # Design Decisions
//! - Any status the backend returns is relayed as-is; only failures of the
//!   relay itself produce a 502

use axum::{
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};

/// Backend response headers never copied to the client.
pub const STRIPPED_RESPONSE_HEADERS: [HeaderName; 2] =
    [header::CONNECTION, header::TRANSFER_ENCODING];

/// Copy of `backend` without the connection-control and transfer-encoding headers.
pub fn relayed_headers(backend: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(backend.len());
    for (name, value) in backend {
        if !STRIPPED_RESPONSE_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// 502 response carrying `message` as a plain-text body.
pub fn bad_gateway(message: impl Into<String>) -> Response {
    (StatusCode::BAD_GATEWAY, message.into()).into_response()
}
