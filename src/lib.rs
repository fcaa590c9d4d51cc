//! LAN relay library.
//!
//! Makes an HTTP service bound to a loopback interface reachable from the
//! local network. Plain requests are replayed against the backend; WebSocket
//! upgrades are handshaken with the backend and then spliced byte for byte.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::RelayConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
