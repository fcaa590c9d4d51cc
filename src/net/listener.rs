//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind to the configured network address
//! - Classify bind failures so startup can print a useful diagnostic
//!
//! # Design Decisions
//! - No admission control: every accepted connection gets its own task

use std::io::ErrorKind;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address does not parse.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    /// Another process already owns the address.
    #[error("address {addr} is already in use")]
    AddrInUse { addr: SocketAddr },

    /// Any other bind failure.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    /// Operator-facing explanation printed before the process exits.
    pub fn diagnostic(&self) -> String {
        match self {
            ListenerError::AddrInUse { addr } => format!(
                "Error: Port {port} on {ip} is already in use.\n\
                 Stop the existing process or use a different port.\n\n\
                 To find the process: lsof -i @{ip}:{port}",
                port = addr.port(),
                ip = addr.ip(),
            ),
            other => format!("Error: {}", other),
        }
    }
}

/// Bind the listening socket described by `config`.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

    let listener = TcpListener::bind(addr).await.map_err(|source| {
        if source.kind() == ErrorKind::AddrInUse {
            ListenerError::AddrInUse { addr }
        } else {
            ListenerError::Bind { addr, source }
        }
    })?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(addr),
        "Listener bound"
    );

    Ok(listener)
}
