//! HTTP rendering of domain errors.
//!
//! # Responsibilities
//! - Map every [`ErrorCode`] to a transport status
//! - Render the JSON body, scrubbing Internal errors
//!
//! # Design Decisions
//! - The mapping is total; codes outside the taxonomy become 500
//! - Internal diagnostics never reach the client body

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use super::{Error, ErrorCode};

/// Non-standard "client closed request" status.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Message sent to clients in place of any Internal error message.
pub const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal server error.";

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::Canceled => CLIENT_CLOSED_REQUEST,
            ErrorCode::Unknown => 500,
            ErrorCode::InvalidArgument => 400,
            ErrorCode::DeadlineExceeded => 500,
            ErrorCode::NotFound => 404,
            ErrorCode::AlreadyExists => 400,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::ResourceExhausted => 500,
            ErrorCode::FailedPrecondition => 400,
            ErrorCode::Aborted => 500,
            ErrorCode::OutOfRange => 500,
            ErrorCode::Unimplemented => 405,
            ErrorCode::Internal => 500,
            ErrorCode::Unavailable => 503,
            ErrorCode::DataLoss => 500,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::ClosedRequest => CLIENT_CLOSED_REQUEST,
        }
    }
}

/// Status for a raw wire code, 500 when it is not part of the taxonomy.
pub fn http_status_for_wire_code(code: u32) -> u16 {
    ErrorCode::try_from(code).map_or(500, ErrorCode::http_status)
}

impl Error {
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Build the client response: mapped status and JSON body.
    pub fn render_to_http_response(&self) -> Result<Response, serde_json::Error> {
        let body = if self.code == ErrorCode::Internal {
            serde_json::to_vec(&Error::new(
                ErrorCode::Internal,
                INTERNAL_SERVER_ERROR_MESSAGE,
            ))?
        } else {
            serde_json::to_vec(self)?
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        Ok(response)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.render_to_http_response() {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
