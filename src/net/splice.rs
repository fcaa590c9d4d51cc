//! Frame relay between an upgraded client connection and its backend connection.
//!
//! # Data Flow
//! ```text
//! client ──read──▶ pump(upstream)   ──write──▶ backend
//! client ◀─write── pump(downstream) ◀──read─── backend
//! ```
//!
//! # Design Decisions
//! - Bytes are opaque: no parsing of the upgraded protocol
//! - Either pump finishing (EOF or error) cancels the other one
//! - `splice` returns only after both pumps have exited; both streams are
//!   dropped (and therefore closed) together

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;

/// Direction of a copy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to backend.
    Upstream,
    /// Backend to client.
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

/// Bytes moved by a finished splice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpliceStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Copy bytes both ways until either side closes or fails.
pub async fn splice<C, B>(client: C, backend: B, chunk_size: usize) -> SpliceStats
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);
    let closed = CancellationToken::new();

    let (client_to_backend, backend_to_client) = tokio::join!(
        pump(client_read, backend_write, chunk_size, &closed, Direction::Upstream),
        pump(backend_read, client_write, chunk_size, &closed, Direction::Downstream),
    );

    SpliceStats {
        client_to_backend,
        backend_to_client,
    }
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
    closed: &CancellationToken,
    direction: Direction,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            _ = closed.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(direction = direction.as_str(), "Peer closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(direction = direction.as_str(), error = %e, "Read failed");
                    break;
                }
            },
        };

        let written = tokio::select! {
            _ = closed.cancelled() => break,
            res = writer.write_all(&buf[..n]) => res,
        };
        if let Err(e) = written {
            tracing::debug!(direction = direction.as_str(), error = %e, "Write failed");
            break;
        }
        total += n as u64;
    }

    closed.cancel();
    let _ = writer.shutdown().await;
    metrics::record_tunnel_bytes(direction.as_str(), total);
    total
}
