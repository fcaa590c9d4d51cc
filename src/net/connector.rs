//! Backend connector.
//!
//! # Responsibilities
//! - Open one fresh TCP connection to the backend per exchange
//! - Bound the connect attempt with a timeout
//! - Report failures as `ConnectError`, never swallow them
//!
//! # Design Decisions
//! - No pooling: a connection is owned by exactly one exchange and closed with it

use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::BackendConfig;
use crate::error::ConnectError;

/// Opens connections to the configured backend.
#[derive(Debug, Clone)]
pub struct BackendConnector {
    addr: String,
    timeout: Duration,
}

impl BackendConnector {
    /// Create a connector for the given backend.
    pub fn new(backend: &BackendConfig, timeout: Duration) -> Self {
        Self {
            addr: backend.address(),
            timeout,
        }
    }

    /// The `host:port` this connector dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Establish a new connection, failing after the configured timeout.
    pub async fn connect(&self) -> Result<TcpStream, ConnectError> {
        let stream = match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ConnectError::Unreachable {
                    addr: self.addr.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ConnectError::Timeout {
                    addr: self.addr.clone(),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on backend connection");
        }

        tracing::trace!(backend = %self.addr, "Backend connection established");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn backend_for(port: u16) -> BackendConfig {
        BackendConfig {
            host: "127.0.0.1".into(),
            port,
        }
    }

    #[tokio::test]
    async fn connects_to_listening_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = BackendConnector::new(&backend_for(port), Duration::from_secs(1));
        let stream = connector.connect().await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = BackendConnector::new(&backend_for(port), Duration::from_secs(1));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::Unreachable { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
    }
}
