//! Plain request/response relay.
//!
//! # Responsibilities
//! - Read exactly the declared body length from the client
//! - Replay method, path and headers (minus hop-by-hop) to the backend
//! - Buffer the full backend response and relay it, whatever its status
//!
//! # Design Decisions
//! - One fresh backend connection per exchange, driven by its own task and
//!   dropped once the response is buffered
//! - 4xx/5xx from the backend are valid responses, not relay errors

use axum::{
    body::Body,
    http::{header, request, Request},
    response::Response,
};
use bytes::Bytes;
use hyper_util::rt::TokioIo;

use crate::error::ForwardError;
use crate::http::request::{backend_host, declared_length, outbound_headers};
use crate::http::response::relayed_headers;
use crate::http::server::AppState;

/// Forward a non-upgrade request and build the client response.
pub async fn relay_request(
    state: &AppState,
    request: Request<Body>,
) -> Result<Response, ForwardError> {
    let (parts, body) = request.into_parts();
    let body = read_declared_body(&parts, body, state.limits.max_body_bytes).await?;
    let outbound = build_outbound(&parts, body, state.connector.addr())?;

    let stream = state.connector.connect().await?;
    let timeout = state.timeouts.request();

    let exchange = async {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ForwardError::Handshake)?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "Backend connection closed with error");
            }
        });

        let response = sender
            .send_request(outbound)
            .await
            .map_err(ForwardError::Request)?;
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), state.limits.max_body_bytes)
            .await
            .map_err(|e| ForwardError::Body(e.to_string()))?;
        Ok::<_, ForwardError>((parts, bytes))
    };

    let (parts, bytes) = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ForwardError::Timeout {
            secs: timeout.as_secs(),
        })??;

    tracing::debug!(
        status = %parts.status,
        body_bytes = bytes.len(),
        "Backend responded"
    );

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = parts.status;
    *response.headers_mut() = relayed_headers(&parts.headers);
    Ok(response)
}

/// Read the body only when a length is declared; never more, never less.
async fn read_declared_body(
    parts: &request::Parts,
    body: Body,
    limit: usize,
) -> Result<Bytes, ForwardError> {
    let declared = match declared_length(&parts.headers) {
        Some(len) if len > 0 => len,
        _ => return Ok(Bytes::new()),
    };

    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| ForwardError::Body(e.to_string()))?;
    if bytes.len() as u64 != declared {
        return Err(ForwardError::Body(format!(
            "expected {} bytes, received {}",
            declared,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// The request sent to the backend: same method and target, filtered headers.
fn build_outbound(
    parts: &request::Parts,
    body: Bytes,
    backend_addr: &str,
) -> Result<Request<Body>, ForwardError> {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut outbound = Request::builder()
        .method(parts.method.clone())
        .uri(target)
        .body(Body::from(body))?;

    let headers = outbound.headers_mut();
    *headers = outbound_headers(&parts.headers);
    if let Some(host) = backend_host(backend_addr) {
        headers.insert(header::HOST, host);
    }
    Ok(outbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method};

    fn parts_with(headers: &[(&'static str, &'static str)]) -> request::Parts {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("http://192.168.1.20:8080/api/items?page=2");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn outbound_keeps_method_and_origin_form_target() {
        let parts = parts_with(&[
            ("host", "192.168.1.20:8080"),
            ("connection", "keep-alive"),
            ("content-type", "application/json"),
        ]);
        let outbound = build_outbound(&parts, Bytes::new(), "127.0.0.1:8080").unwrap();

        assert_eq!(outbound.method(), Method::POST);
        assert_eq!(outbound.uri(), "/api/items?page=2");
        assert_eq!(outbound.headers()[header::HOST], "127.0.0.1:8080");
        assert!(outbound.headers().get(header::CONNECTION).is_none());
        assert_eq!(
            outbound.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static("application/json")
        );
    }

    #[tokio::test]
    async fn body_read_only_when_declared() {
        let parts = parts_with(&[]);
        let body = read_declared_body(&parts, Body::from("ignored"), 1024)
            .await
            .unwrap();
        assert!(body.is_empty());

        let parts = parts_with(&[("content-length", "0")]);
        let body = read_declared_body(&parts, Body::empty(), 1024).await.unwrap();
        assert!(body.is_empty());

        let parts = parts_with(&[("content-length", "5")]);
        let body = read_declared_body(&parts, Body::from("hello"), 1024)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn short_body_is_rejected() {
        let parts = parts_with(&[("content-length", "10")]);
        let err = read_declared_body(&parts, Body::from("short"), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Body(_)));
    }
}
