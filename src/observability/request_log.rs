//! Request logging middleware.
//!
//! Mounted with `axum::middleware::from_fn_with_state(logger, log_requests)`.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::http::request::request_id;
use crate::observability::logging::{any, string, uint64, Logger};

/// Log method, path, status and latency of every request.
pub async fn log_requests(State(logger): State<Logger>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let id = request_id(request.headers()).unwrap_or_default().to_string();

    let response = next.run(request).await;

    logger.info(
        "Served HTTP request.",
        &[
            string("request_id", id),
            string("method", method),
            string("path", path),
            uint64("status", u64::from(response.status().as_u16())),
            any("latency_ms", &(start.elapsed().as_secs_f64() * 1000.0)),
        ],
    );
    response
}
