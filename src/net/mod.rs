//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, classify bind failures)
//!     → Hand off to HTTP layer
//!
//! Outgoing backend connection
//!     → connector.rs (one fresh connection per exchange, connect timeout)
//!
//! After a successful upgrade
//!     → connection.rs (tunnel id, live tunnel accounting)
//!     → splice.rs (bidirectional byte relay, symmetric teardown)
//! ```
//!
//! # Design Decisions
//! - No connection pooling and no admission control
//! - Tunnels are tracked so shutdown can drain them

pub mod connection;
pub mod connector;
pub mod listener;
pub mod splice;

pub use connection::{TunnelGuard, TunnelId, TunnelTracker};
pub use connector::BackendConnector;
pub use listener::ListenerError;
pub use splice::{splice, SpliceStats};
