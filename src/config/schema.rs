//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! field has a default so a missing file section falls back cleanly.

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// HTTP listener and CORS settings.
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            http: HttpConfig::default(),
        }
    }
}

/// HTTP listener and CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address. `":8000"` binds every interface.
    pub bind_addr: String,

    /// Origins allowed by CORS on `/api`. Empty allows any origin.
    pub allowed_origins: Vec<String>,

    /// Methods allowed by CORS on `/api`.
    pub allowed_methods: Vec<String>,

    /// Request headers allowed by CORS on `/api`.
    pub allowed_headers: Vec<String>,

    /// Whether CORS responses allow credentials.
    pub allow_credentials: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: ":8000".to_string(),
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            allow_credentials: false,
        }
    }
}

impl HttpConfig {
    /// Bind address in `host:port` form, expanding a bare `:port`.
    pub fn socket_address(&self) -> String {
        match self.bind_addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.bind_addr.clone(),
        }
    }
}
