//! Tunnel identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique tunnel IDs for tracing
//! - Count live tunnels so shutdown can drain them
//! - Keep the active tunnel gauge in sync

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for tunnel IDs.
/// Relaxed ordering is enough since we only need uniqueness.
static TUNNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upgraded connection pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelId(u64);

impl TunnelId {
    /// Generate a new unique tunnel ID.
    pub fn new() -> Self {
        Self(TUNNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TunnelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tunnel-{}", self.0)
    }
}

/// Tracks live tunnels for graceful shutdown.
///
/// The live count is held in a watch channel so shutdown can wait for it to
/// reach zero without polling.
#[derive(Debug, Clone)]
pub struct TunnelTracker {
    active: Arc<watch::Sender<u64>>,
}

impl TunnelTracker {
    /// Create a new tunnel tracker.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new live tunnel. Returns a guard that decrements on drop.
    pub fn track(&self) -> TunnelGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::tunnel_opened();
        TunnelGuard {
            active: Arc::clone(&self.active),
            id: TunnelId::new(),
        }
    }

    /// Get current live tunnel count.
    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until every tunnel has closed or `grace` elapses.
    ///
    /// Returns the number of tunnels still open when it gave up.
    pub async fn wait_idle(&self, grace: Duration) -> u64 {
        let mut rx = self.active.subscribe();
        let drained = tokio::time::timeout(grace, rx.wait_for(|count| *count == 0))
            .await
            .is_ok();
        if drained {
            0
        } else {
            self.active_count()
        }
    }
}

impl Default for TunnelTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a tunnel's lifetime.
/// Decrements the live count when dropped.
#[derive(Debug)]
pub struct TunnelGuard {
    active: Arc<watch::Sender<u64>>,
    id: TunnelId,
}

impl TunnelGuard {
    /// Get this tunnel's ID.
    pub fn id(&self) -> TunnelId {
        self.id
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        metrics::tunnel_closed();
        tracing::trace!(tunnel_id = %self.id, "Tunnel released");
    }
}
