//! Panic recovery middleware.
//!
//! # Responsibilities
//! - Catch panics raised while building or polling the inner handler
//! - Log them and answer with a generic Internal error
//! - Stay silent for deliberately aborted handlers
//!
//! # Design Decisions
//! - Outermost layer so failures in every inner stage are caught
//! - Exactly one response leaves this layer per request
//! - An aborted handler's response is tagged with [`HandlerAborted`]; the
//!   server drops the connection instead of writing it

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::task::{Context, Poll};

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};
use tower::{Layer, Service};

use crate::error::{Error, ErrorCode, CLIENT_CLOSED_REQUEST};
use crate::observability::logging::{string, Logger};

/// Panic payload for a handler that abandoned its connection on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("handler aborted")]
pub struct HandlerAborted;

/// Abort the current handler without logging or rendering an error. The
/// client gets no response.
pub fn abort_handler() -> ! {
    panic::panic_any(HandlerAborted)
}

/// Whether `response` stands in for an aborted handler.
pub fn is_aborted(response: &Response) -> bool {
    response.extensions().get::<HandlerAborted>().is_some()
}

/// Converts handler panics into Internal error responses.
#[derive(Debug, Clone)]
pub struct PanicRecoverer {
    logger: Logger,
}

impl PanicRecoverer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn layer(&self) -> RecoverLayer {
        RecoverLayer {
            recoverer: self.clone(),
        }
    }

    fn respond(&self, payload: Box<dyn Any + Send>) -> Response {
        if payload.is::<HandlerAborted>() {
            let mut response = StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::BAD_REQUEST)
                .into_response();
            response.extensions_mut().insert(HandlerAborted);
            return response;
        }

        self.logger.error(
            "Panic while serving HTTP request.",
            &[string("details", panic_details(payload.as_ref()))],
        );
        Error::new(ErrorCode::Internal, "").into_response()
    }
}

fn panic_details(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RecoverLayer {
    recoverer: PanicRecoverer,
}

impl<S> Layer<S> for RecoverLayer {
    type Service = Recover<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recover {
            inner,
            recoverer: self.recoverer.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recover<S> {
    inner: S,
    recoverer: PanicRecoverer,
}

impl<S> Service<Request> for Recover<S>
where
    S: Service<Request, Response = Response>,
    S::Future: Send + 'static,
    S::Error: 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let recoverer = self.recoverer.clone();
        let inner = &mut self.inner;

        match panic::catch_unwind(AssertUnwindSafe(|| inner.call(request))) {
            Ok(future) => Box::pin(async move {
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Ok(recoverer.respond(payload)),
                }
            }),
            Err(payload) => {
                let response = recoverer.respond(payload);
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::capture::CapturedLogs;
    use axum::{body::Body, routing::get, Router};
    use std::convert::Infallible;
    use tower::ServiceExt;

    fn recoverer() -> (PanicRecoverer, CapturedLogs) {
        let logs = CapturedLogs::default();
        let logger = Logger::with_writer("info", logs.clone()).unwrap();
        (PanicRecoverer::new(logger), logs)
    }

    fn get_request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn boom() -> &'static str {
        panic!("boom")
    }

    async fn abandon() -> &'static str {
        abort_handler()
    }

    #[tokio::test]
    async fn panic_becomes_internal_error_and_is_logged() {
        let (recoverer, logs) = recoverer();
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(recoverer.layer());

        let response = app.oneshot(get_request("/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!is_aborted(&response));
        assert_eq!(
            body_string(response).await,
            r#"{"code":13,"message":"Internal server error.","params":null}"#
        );

        let entries = logs.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["level"], "ERROR");
        assert_eq!(entries[0]["message"], "Panic while serving HTTP request.");
        assert_eq!(entries[0]["details"], "boom");
    }

    #[tokio::test]
    async fn formatted_panic_message_is_logged() {
        let (recoverer, logs) = recoverer();
        let app = Router::new()
            .route(
                "/fmt",
                get(|| async {
                    let id = 7;
                    if id == 7 {
                        panic!("widget {id} vanished");
                    }
                    ""
                }),
            )
            .layer(recoverer.layer());

        let response = app.oneshot(get_request("/fmt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(logs.contents().contains("widget 7 vanished"));
    }

    #[tokio::test]
    async fn aborted_handler_is_silent() {
        let (recoverer, logs) = recoverer();
        let app = Router::new()
            .route("/abandon", get(abandon))
            .layer(recoverer.layer());

        let response = app.oneshot(get_request("/abandon")).await.unwrap();
        assert_eq!(response.status().as_u16(), CLIENT_CLOSED_REQUEST);
        assert!(is_aborted(&response));
        assert!(body_string(response).await.is_empty());
        assert!(logs.contents().is_empty());
    }

    #[tokio::test]
    async fn panic_while_building_the_future_is_caught() {
        let (recoverer, logs) = recoverer();
        let service = recoverer.layer().layer(tower::service_fn(
            |_: Request| -> futures_util::future::Ready<Result<Response, Infallible>> {
                panic!("sync boom")
            },
        ));

        let response = service.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(logs.contents().contains("sync boom"));
    }

    #[tokio::test]
    async fn healthy_handlers_pass_through() {
        let (recoverer, logs) = recoverer();
        let app = Router::new()
            .route("/ok", get(|| async { "fine" }))
            .layer(recoverer.layer());

        let response = app.oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "fine");
        assert!(logs.contents().is_empty());
    }
}
