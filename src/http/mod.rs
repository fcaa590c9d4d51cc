//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request span, dispatch)
//!     → upgrade.rs classifies the request
//!         plain:   forward.rs (request.rs headers → backend → response.rs headers)
//!         upgrade: handshake.rs (verbatim head → backend → 101?) → net::splice
//!     → Send to client
//! ```

pub mod forward;
pub mod handshake;
pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use request::X_REQUEST_ID;
pub use server::{AppState, RelayServer};
pub use upgrade::is_upgrade_request;
