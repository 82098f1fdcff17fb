//! CORS policy for the `/api` scope.

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::HttpConfig;

const WILDCARD: &str = "*";

#[derive(Debug, thiserror::Error)]
pub enum CorsError {
    #[error("invalid CORS origin {0:?}")]
    Origin(String),
    #[error("invalid CORS method {0:?}")]
    Method(String),
    #[error("invalid CORS header {0:?}")]
    Header(String),
}

/// Build the CORS layer from configuration.
///
/// Empty lists fall back to permissive defaults: any origin, `GET`/`POST`/`HEAD`,
/// and the `Accept`, `Content-Type` and `X-Requested-With` headers. Wildcards
/// combined with credentials mirror the request instead of answering `*`.
pub fn cors_layer(config: &HttpConfig) -> Result<CorsLayer, CorsError> {
    let credentials = config.allow_credentials;

    Ok(CorsLayer::new()
        .allow_origin(allow_origin(&config.allowed_origins, credentials)?)
        .allow_methods(allow_methods(&config.allowed_methods, credentials)?)
        .allow_headers(allow_headers(&config.allowed_headers, credentials)?)
        .allow_credentials(credentials))
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|value| value == WILDCARD)
}

fn allow_origin(origins: &[String], credentials: bool) -> Result<AllowOrigin, CorsError> {
    if origins.is_empty() || is_wildcard(origins) {
        return Ok(if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        });
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| CorsError::Origin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AllowOrigin::list(origins))
}

fn allow_methods(methods: &[String], credentials: bool) -> Result<AllowMethods, CorsError> {
    if methods.is_empty() {
        return Ok(AllowMethods::list([Method::GET, Method::POST, Method::HEAD]));
    }
    if is_wildcard(methods) {
        return Ok(if credentials {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::any()
        });
    }

    let methods = methods
        .iter()
        .map(|method| {
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| CorsError::Method(method.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AllowMethods::list(methods))
}

fn allow_headers(headers: &[String], credentials: bool) -> Result<AllowHeaders, CorsError> {
    if headers.is_empty() {
        return Ok(AllowHeaders::list([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ]));
    }
    if is_wildcard(headers) {
        return Ok(if credentials {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::any()
        });
    }

    let headers = headers
        .iter()
        .map(|name| {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| CorsError::Header(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AllowHeaders::list(headers))
}
