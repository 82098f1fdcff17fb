//! HTTP service bootstrap: domain errors, structured logging, panic recovery,
//! and a gracefully stoppable axum server wired together by a container.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::Config;
pub use error::{Error, ErrorCode};
pub use http::HttpServer;
pub use lifecycle::Container;
pub use observability::Logger;
