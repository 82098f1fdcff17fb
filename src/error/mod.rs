//! Domain error subsystem.
//!
//! # Data Flow
//! ```text
//! failure detected
//!     → Error::new / factory (code + user-facing message)
//!     → with_param / with_cause (diagnostic context)
//!     → logged via observability::logging::error (cause never logged)
//!     → rendered via http.rs (status mapping, Internal scrubbed)
//! ```
//!
//! # Design Decisions
//! - `message` is safe to show clients; `cause` is only for diagnostics
//! - Equality ignores the cause and the order of params
//! - Serialized shape: `{"code": int, "message": string, "params": [..] | null}`

pub mod code;
pub mod http;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use code::{ErrorCode, UnknownErrorCode};
pub use http::{http_status_for_wire_code, CLIENT_CLOSED_REQUEST, INTERNAL_SERVER_ERROR_MESSAGE};

/// Underlying error attached for diagnostics.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Diagnostic key/value pair attached to an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Params in insertion order.
pub type Params = Vec<Param>;

/// Structured, classifiable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[serde(
        default,
        serialize_with = "serialize_params",
        deserialize_with = "deserialize_params"
    )]
    params: Params,
    #[serde(skip)]
    cause: Option<Cause>,
}

fn serialize_params<S: Serializer>(params: &Params, serializer: S) -> Result<S::Ok, S::Error> {
    if params.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_seq(params)
    }
}

fn deserialize_params<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Params, D::Error> {
    Ok(Option::<Params>::deserialize(deserializer)?.unwrap_or_default())
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            params: Vec::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Append a param in place. Duplicate keys are kept.
    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.push(Param::new(key, value));
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_param(key, value);
        self
    }

    /// Replace the params when there are none yet, append otherwise.
    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        if self.params.is_empty() {
            self.params = params.into_iter().collect();
        } else {
            self.params.extend(params);
        }
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// First domain error in the source chain of `err`, starting with `err` itself.
    pub fn find<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a Error> {
        let mut current = Some(err);
        while let Some(candidate) = current {
            if let Some(found) = candidate.downcast_ref::<Error>() {
                return Some(found);
            }
            current = candidate.source();
        }
        None
    }

    /// Structural comparison against any error that is, or wraps, a domain error.
    pub fn is_equal(&self, other: &(dyn StdError + 'static)) -> bool {
        Error::find(other).is_some_and(|other| self == other)
    }

    fn sorted_params(&self) -> Vec<&Param> {
        let mut params: Vec<&Param> = self.params.iter().collect();
        params.sort();
        params
    }

    // Constructors for common failures.

    pub fn unexpected_behaviour(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, "Unexpected behavior.").with_param("details", details)
    }

    pub fn invalid_form() -> Self {
        Self::new(ErrorCode::InvalidArgument, "The request data is invalid.")
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn entity_not_found() -> Self {
        Self::new(ErrorCode::NotFound, "Entity not found.")
    }

    pub fn bad_token() -> Self {
        Self::new(ErrorCode::PermissionDenied, "Bad token.")
    }

    pub fn permission_denied() -> Self {
        Self::new(ErrorCode::PermissionDenied, "Permission denied.")
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "Unauthenticated error.")
    }

    pub fn entity_already_exists() -> Self {
        Self::new(ErrorCode::AlreadyExists, "Entity already exists.")
    }

    pub fn json_deserialization(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidArgument, "Failed to deserialize JSON.").with_cause(err)
    }

    pub fn json_serialization(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::Internal, "Failed to serialize JSON.").with_cause(err)
    }

    pub fn base64_encoding<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(ErrorCode::Internal, "Failed to encode base64.").with_cause(err)
    }

    pub fn base64_decoding<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(ErrorCode::InvalidArgument, "Failed to decode base64.").with_cause(err)
    }

    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && self.sorted_params() == other.sorted_params()
    }
}

impl Eq for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "Error: {}", self.message),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}
