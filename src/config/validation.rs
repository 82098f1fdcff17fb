//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the bind address has a usable port
//! - Check CORS method names are valid HTTP tokens
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Log level is checked by the logger, which owns the level grammar

use axum::http::Method;

use crate::config::schema::Config;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("bind address {0:?} must have the form host:port or :port")]
    BindAddress(String),
    #[error("allowed method {0:?} is not a valid HTTP method")]
    Method(String),
}

pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addr = &config.http.bind_addr;
    let port_ok = addr
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    if !port_ok {
        errors.push(ValidationError::BindAddress(addr.clone()));
    }

    for method in &config.http.allowed_methods {
        if method != "*" && Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::Method(method.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
