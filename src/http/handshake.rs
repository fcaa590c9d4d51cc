//! Upgrade handshake forwarding.
//!
//! # Responsibilities
//! - Serialize the inbound request head verbatim for the backend
//! - Read the backend's response head within a deadline and a byte bound
//! - Keep bytes read past the head terminator; they start the tunnel stream
//! - Collect the body of a refused handshake so it can be relayed
//!
//! # Design Decisions
//! - Only `HTTP/1.1 101` counts as success; every other status is relayed
//!   to the client as an ordinary response and no tunnel is opened

use axum::{
    body::Body,
    http::{header, request, HeaderMap, HeaderName, HeaderValue, StatusCode, Version},
    response::Response,
};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::config::LimitsConfig;
use crate::error::HandshakeError;
use crate::http::response::relayed_headers;

const MAX_HEADERS: usize = 64;

/// The backend's answer to a forwarded upgrade request.
#[derive(Debug)]
pub struct HandshakeResponse {
    pub version: Version,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Bytes received after the `\r\n\r\n` terminator.
    pub trailing: BytesMut,
}

impl HandshakeResponse {
    /// Whether the backend agreed to switch protocols.
    pub fn is_switching_protocols(&self) -> bool {
        self.version == Version::HTTP_11 && self.status == StatusCode::SWITCHING_PROTOCOLS
    }

    /// Response for the client, carrying every backend header unchanged.
    ///
    /// The trailing bytes are returned separately; they must be written to the
    /// upgraded client connection before splicing.
    pub fn into_switching_response(self) -> (Response, Bytes) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        (response, self.trailing.freeze())
    }

    /// Response for the client when the backend refused the upgrade.
    pub fn into_refusal_response(self, body: Bytes) -> Response {
        let mut headers = relayed_headers(&self.headers);
        headers.remove(header::CONTENT_LENGTH);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

/// Request line and headers exactly as the client sent them, as HTTP/1.1.
pub fn serialize_request_head(parts: &request::Parts) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(parts.method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(target.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in &parts.headers {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// Send the request head to the backend and read its response head.
pub async fn forward_handshake<S>(
    backend: &mut S,
    parts: &request::Parts,
    deadline: Instant,
    limits: &LimitsConfig,
) -> Result<HandshakeResponse, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = serialize_request_head(parts);
    match tokio::time::timeout_at(deadline, backend.write_all(&head)).await {
        Ok(result) => result?,
        Err(_) => return Err(HandshakeError::Timeout { received: 0 }),
    }

    read_response_head(
        backend,
        deadline,
        limits.max_handshake_bytes,
        limits.relay_chunk_size,
    )
    .await
}

/// Read until a complete response head has arrived.
pub async fn read_response_head<S>(
    stream: &mut S,
    deadline: Instant,
    max_bytes: usize,
    chunk_size: usize,
) -> Result<HandshakeResponse, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(chunk_size);
    loop {
        if let Some(response) = parse_response_head(&mut buf)? {
            return Ok(response);
        }
        if buf.len() >= max_bytes {
            return Err(HandshakeError::TooLarge { limit: max_bytes });
        }

        let n = read_chunk(stream, &mut buf, deadline, chunk_size)
            .await
            .map_err(|e| match e {
                ReadStop::Deadline => HandshakeError::Timeout { received: buf.len() },
                ReadStop::Io(e) => HandshakeError::Io(e),
            })?;
        if n == 0 {
            return Err(HandshakeError::Closed { received: buf.len() });
        }
    }
}

/// Collect the body of a refused handshake.
///
/// Reading stops once the framing says the body is complete, at end of
/// stream, at the deadline, or at `max_bytes`. Whatever arrived by then is
/// returned.
pub async fn read_refusal_body<S>(
    stream: &mut S,
    response: &mut HandshakeResponse,
    deadline: Instant,
    max_bytes: usize,
    chunk_size: usize,
) -> Bytes
where
    S: AsyncRead + Unpin,
{
    let framing = BodyFraming::of(response);
    while !framing.is_complete(&response.trailing) && response.trailing.len() < max_bytes {
        match read_chunk(stream, &mut response.trailing, deadline, chunk_size).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(ReadStop::Deadline) => {
                tracing::debug!(received = response.trailing.len(), "Refusal body read timed out");
                break;
            }
            Err(ReadStop::Io(e)) => {
                tracing::debug!(error = %e, "Refusal body read failed");
                break;
            }
        }
    }
    framing.decode(&response.trailing)
}

enum ReadStop {
    Deadline,
    Io(std::io::Error),
}

async fn read_chunk<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    deadline: Instant,
    chunk_size: usize,
) -> Result<usize, ReadStop>
where
    S: AsyncRead + Unpin,
{
    buf.reserve(chunk_size);
    let mut limited = (&mut *stream).take(chunk_size as u64);
    match tokio::time::timeout_at(deadline, limited.read_buf(buf)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(ReadStop::Io(e)),
        Err(_) => Err(ReadStop::Deadline),
    }
}

/// Parse a response head from the front of `buf`.
///
/// On success the head is consumed and `buf` holds only the trailing bytes.
fn parse_response_head(buf: &mut BytesMut) -> Result<Option<HandshakeResponse>, HandshakeError> {
    let (head_len, version, status, headers) = {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut storage);
        let head_len = match parsed.parse(&buf[..]) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => return Err(HandshakeError::Malformed(e.to_string())),
        };

        let version = match parsed.version {
            Some(1) => Version::HTTP_11,
            _ => Version::HTTP_10,
        };
        let status = parsed
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| HandshakeError::Malformed("invalid status code".into()))?;

        let mut headers = HeaderMap::with_capacity(parsed.headers.len());
        for h in parsed.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|e| HandshakeError::Malformed(e.to_string()))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|e| HandshakeError::Malformed(e.to_string()))?;
            headers.append(name, value);
        }
        (head_len, version, status, headers)
    };

    buf.advance(head_len);
    Ok(Some(HandshakeResponse {
        version,
        status,
        headers,
        trailing: std::mem::take(buf),
    }))
}

/// How the end of a refusal body is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Length(usize),
    Chunked,
    UntilClose,
}

impl BodyFraming {
    fn of(response: &HandshakeResponse) -> Self {
        let status = response.status;
        if status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return BodyFraming::Length(0);
        }

        let chunked = response
            .headers
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return BodyFraming::Chunked;
        }

        match crate::http::request::declared_length(&response.headers) {
            Some(len) => BodyFraming::Length(usize::try_from(len).unwrap_or(usize::MAX)),
            None => BodyFraming::UntilClose,
        }
    }

    fn is_complete(&self, received: &[u8]) -> bool {
        match self {
            BodyFraming::Length(len) => received.len() >= *len,
            BodyFraming::Chunked => decode_chunked(received).is_some(),
            BodyFraming::UntilClose => false,
        }
    }

    fn decode(&self, received: &[u8]) -> Bytes {
        match self {
            BodyFraming::Length(len) => {
                Bytes::copy_from_slice(&received[..received.len().min(*len)])
            }
            BodyFraming::Chunked => decode_chunked(received).map(Bytes::from).unwrap_or_default(),
            BodyFraming::UntilClose => Bytes::copy_from_slice(received),
        }
    }
}

/// Decode a complete chunked body; `None` until the last chunk has arrived.
fn decode_chunked(mut rest: &[u8]) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let (start, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete((start, size))) => (start, usize::try_from(size).ok()?),
            _ => return None,
        };
        rest = &rest[start..];
        if size == 0 {
            return Some(body);
        }
        let end = size.checked_add(2)?;
        if rest.len() < end {
            return None;
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[end..];
    }
}
