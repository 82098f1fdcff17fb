//! Service entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ server (accept, timeouts) ──▶ recoverer ──▶ request id
//!                                               ──▶ request log ──▶ /health, /api
//!
//!     container: config → logger → recoverer → router → server
//!     signals:   SIGINT / SIGTERM → container.stop(30s)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use workout::lifecycle::{shutdown_signal, Container};
use workout::observability::logging::string;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "workout", version, about = "Run the workout HTTP service")]
struct Cli {
    /// TOML configuration file. Environment variables override its values.
    #[arg(short, long, env = "HORECA_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let container = Container::new(cli.config.as_deref())?;
    let logger = container.logger().clone();
    tracing::dispatcher::set_global_default(logger.dispatch().clone())?;

    let mut signal_error = None;
    let shutdown = async {
        match shutdown_signal().await {
            Ok(signal) => logger.info(
                "Shutdown signal received.",
                &[string("signal", signal.to_string())],
            ),
            Err(err) => signal_error = Some(err),
        }
    };
    container.serve_until(shutdown, SHUTDOWN_GRACE).await?;
    if let Some(err) = signal_error {
        return Err(err.into());
    }

    logger.info("Shutdown complete.", &[]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_accepts_short_and_long_flags() {
        let short = Cli::try_parse_from(["workout", "-c", "short.toml"]).unwrap();
        assert_eq!(short.config, Some(PathBuf::from("short.toml")));

        let long = Cli::try_parse_from(["workout", "--config", "long.toml"]).unwrap();
        assert_eq!(long.config, Some(PathBuf::from("long.toml")));
    }

    #[test]
    fn config_names_its_environment_variable() {
        let command = Cli::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert_eq!(
            config.get_env(),
            Some(std::ffi::OsStr::new("HORECA_CONFIG_PATH"))
        );
    }
}
