//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP stream
//!     → connection.rs (idle timeout wrapper, live-connection tracking)
//!     → Hand off to HTTP layer
//! ```

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, IdleTimeout};
