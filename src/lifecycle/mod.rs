//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (container.rs):
//!     Load config → Validate → Logger → Recoverer → Router → Server → Listen
//!
//! Shutdown (container.rs, signals.rs):
//!     SIGTERM/SIGINT → Stop accepting → Drain connections → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has timeout: stragglers are aborted after the deadline

pub mod container;
pub mod signals;

pub use container::{Container, ContainerError};
pub use signals::{shutdown_signal, ShutdownSignal};
