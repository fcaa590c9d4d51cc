//! Error types for each relay boundary.
//!
//! Errors raised before a tunnel is spliced are turned into a 502 response by
//! the HTTP layer. Errors raised after that point only close the connections.

use thiserror::Error;

/// The backend could not be reached.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection to {addr} failed: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {addr} timed out after {secs}s")]
    Timeout { addr: String, secs: u64 },
}

/// Failures of the plain request/response path.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Cannot connect to backend - {0}")]
    Connect(#[from] ConnectError),

    #[error("backend handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("backend request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("backend did not respond within {secs}s")]
    Timeout { secs: u64 },

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
}

/// Failures of the upgrade handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),

    #[error("no complete response head within timeout ({received} bytes received)")]
    Timeout { received: usize },

    #[error("backend closed the connection mid-handshake ({received} bytes received)")]
    Closed { received: usize },

    #[error("handshake response exceeded {limit} bytes")]
    TooLarge { limit: usize },

    #[error("malformed handshake response: {0}")]
    Malformed(String),
}

impl ConnectError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectError::Unreachable { .. } => "unreachable",
            ConnectError::Timeout { .. } => "connect_timeout",
        }
    }
}

impl ForwardError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Connect(e) => e.kind(),
            ForwardError::Handshake(_) | ForwardError::Request(_) => "transport",
            ForwardError::Timeout { .. } => "timeout",
            ForwardError::Body(_) => "body",
            ForwardError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl HandshakeError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeError::Connect(e) => e.kind(),
            HandshakeError::Io(_) => "transport",
            HandshakeError::Timeout { .. } => "handshake_timeout",
            HandshakeError::Closed { .. } => "handshake_closed",
            HandshakeError::TooLarge { .. } => "handshake_too_large",
            HandshakeError::Malformed(_) => "handshake_malformed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_message_names_backend() {
        let err = ForwardError::from(ConnectError::Timeout {
            addr: "127.0.0.1:8080".into(),
            secs: 5,
        });
        assert_eq!(
            err.to_string(),
            "Cannot connect to backend - connection to 127.0.0.1:8080 timed out after 5s"
        );
        assert_eq!(err.kind(), "connect_timeout");
    }

    #[test]
    fn handshake_connect_error_is_transparent() {
        let err = HandshakeError::from(ConnectError::Unreachable {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        });
        assert!(err.to_string().starts_with("connection to 127.0.0.1:1 failed"));
        assert_eq!(err.kind(), "unreachable");
    }
}
