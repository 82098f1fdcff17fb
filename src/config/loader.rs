//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_ALLOWED_METHODS: &str = "ALLOWED_METHODS";
pub const ENV_ALLOWED_HEADERS: &str = "ALLOWED_HEADERS";
pub const ENV_ALLOW_CREDENTIALS: &str = "ALLOW_CREDENTIALS";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from the process environment, on top of `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |var| std::env::var(var).ok())
}

/// Load configuration with an explicit environment lookup.
///
/// Precedence: defaults, then the TOML file, then environment variables.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => Config::default(),
    };

    apply_env(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env<F>(config: &mut Config, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = env(ENV_LOG_LEVEL) {
        config.log_level = level;
    }
    if let Some(addr) = env(ENV_BIND_ADDR) {
        config.http.bind_addr = addr;
    }
    if let Some(origins) = env(ENV_ALLOWED_ORIGINS) {
        config.http.allowed_origins = split_list(&origins);
    }
    if let Some(methods) = env(ENV_ALLOWED_METHODS) {
        config.http.allowed_methods = split_list(&methods);
    }
    if let Some(headers) = env(ENV_ALLOWED_HEADERS) {
        config.http.allowed_headers = split_list(&headers);
    }
    if let Some(raw) = env(ENV_ALLOW_CREDENTIALS) {
        config.http.allow_credentials = parse_bool(&raw).ok_or(ConfigError::Env {
            var: ENV_ALLOW_CREDENTIALS,
            value: raw,
        })?;
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("workout-{}-{name}", std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load_config_with_env(None, env_from(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn environment_populates_every_field() {
        let config = load_config_with_env(
            None,
            env_from(&[
                ("LOG_LEVEL", "info"),
                ("BIND_ADDR", "127.0.0.1:9001"),
                ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
                ("ALLOWED_METHODS", "GET,POST"),
                ("ALLOWED_HEADERS", "Authorization"),
                ("ALLOW_CREDENTIALS", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.http.bind_addr, "127.0.0.1:9001");
        assert_eq!(
            config.http.allowed_origins,
            ["https://a.example", "https://b.example"]
        );
        assert_eq!(config.http.allowed_methods, ["GET", "POST"]);
        assert_eq!(config.http.allowed_headers, ["Authorization"]);
        assert!(config.http.allow_credentials);
    }

    #[test]
    fn environment_overrides_file() {
        let path = write_temp(
            "override.toml",
            r#"
            log_level = "warn"

            [http]
            bind_addr = "127.0.0.1:7000"
            allowed_methods = ["GET"]
            "#,
        );

        let config =
            load_config_with_env(Some(&path), env_from(&[("LOG_LEVEL", "error")])).unwrap();
        fs::remove_file(&path).unwrap_or_default();

        assert_eq!(config.log_level, "error");
        assert_eq!(config.http.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.http.allowed_methods, ["GET"]);
    }

    #[test]
    fn invalid_boolean_is_rejected() {
        let err = load_config_with_env(None, env_from(&[("ALLOW_CREDENTIALS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "ALLOW_CREDENTIALS", .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config_with_env(
            Some(Path::new("/nonexistent/workout.toml")),
            env_from(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let path = write_temp("broken.toml", "log_level = [");
        let err = load_config_with_env(Some(&path), env_from(&[])).unwrap_err();
        fs::remove_file(&path).unwrap_or_default();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn bool_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }
}
