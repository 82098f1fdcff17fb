//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, timeouts, graceful drain)
//!     → recoverer.rs (panic boundary)
//!     → request.rs (assign and echo the request ID)
//!     → observability::request_log (one entry per request)
//!     → router.rs (/health, /api behind cors.rs)
//! ```

pub mod cors;
pub mod recoverer;
pub mod request;
pub mod router;
pub mod server;

pub use cors::{cors_layer, CorsError};
pub use recoverer::{abort_handler, is_aborted, HandlerAborted, PanicRecoverer};
pub use request::X_REQUEST_ID;
pub use router::{HttpRouter, RouterError};
pub use server::{HttpServer, ServerError};
