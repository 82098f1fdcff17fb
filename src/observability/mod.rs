//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (leveled entries with structured fields)
//!     → request_log.rs (one entry per served request)
//!
//! Consumers:
//!     → stdout, one JSON object per line
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows into every request log entry
//! - Domain errors are logged by taxonomy fields, never by cause

pub mod logging;
pub mod request_log;

pub use logging::{Field, Logger, LoggerError};
pub use request_log::log_requests;
