//! Root router construction.
//!
//! # Responsibilities
//! - Register the liveness probe
//! - Mount `/api` routes behind the CORS policy
//! - Wrap everything in the shared middleware chain
//!
//! # Design Decisions
//! - Middleware order, outermost first: recoverer, request ID, ID
//!   propagation, request logging
//! - `/health` sits outside `/api` so probes never depend on CORS

use axum::{http::StatusCode, middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::config::HttpConfig;
use crate::http::cors::{cors_layer, CorsError};
use crate::http::recoverer::PanicRecoverer;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::{log_requests, Logger};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Cors(#[from] CorsError),
}

/// Builder for the service's root handler.
#[derive(Clone)]
pub struct HttpRouter {
    logger: Logger,
    recoverer: PanicRecoverer,
    cors: CorsLayer,
    api: Option<Router>,
}

impl HttpRouter {
    pub fn new(
        logger: Logger,
        config: &HttpConfig,
        recoverer: PanicRecoverer,
    ) -> Result<Self, RouterError> {
        Ok(Self {
            logger,
            recoverer,
            cors: cors_layer(config)?,
            api: None,
        })
    }

    /// Mount `routes` under `/api`. Repeated calls merge.
    pub fn api(mut self, routes: Router) -> Self {
        self.api = Some(match self.api.take() {
            Some(existing) => existing.merge(routes),
            None => routes,
        });
        self
    }

    /// The fully wired root handler.
    pub fn handler(&self) -> Router {
        let mut root = Router::new().route("/health", get(health));

        if let Some(api) = &self.api {
            root = root.nest("/api", api.clone().layer(self.cors.clone()));
        }

        root.layer(
            ServiceBuilder::new()
                .layer(self.recoverer.layer())
                .layer(set_request_id_layer())
                .layer(propagate_request_id_layer())
                .layer(middleware::from_fn_with_state(
                    self.logger.clone(),
                    log_requests,
                )),
        )
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}
