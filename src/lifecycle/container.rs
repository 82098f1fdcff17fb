//! Application container.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the logger, recoverer, router and server in dependency order
//! - Run the server in a supervised task and stop it on request
//!
//! # Design Decisions
//! - Fail fast: any construction error is returned before anything binds
//! - The listener starts last, so traffic arrives only when everything is wired

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinError;

use crate::config::validation::validate_config;
use crate::config::{load_config, Config, ConfigError};
use crate::http::{HttpRouter, HttpServer, PanicRecoverer, RouterError, ServerError};
use crate::observability::{Logger, LoggerError};

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logger(#[from] LoggerError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("server task failed: {0}")]
    Task(#[from] JoinError),
}

/// Owns every long-lived component of the service.
pub struct Container {
    config: Config,
    logger: Logger,
    server: Arc<HttpServer>,
}

impl Container {
    /// Build from the environment, layered over the TOML file at `config_path`.
    pub fn new(config_path: Option<&Path>) -> Result<Self, ContainerError> {
        Self::from_config(load_config(config_path)?)
    }

    /// Build from an already loaded configuration, logging to stdout.
    pub fn from_config(config: Config) -> Result<Self, ContainerError> {
        let logger = Logger::new(&config.log_level)?;
        Self::assemble(config, logger, None)
    }

    /// Build with an explicit logger and optional routes mounted under `/api`.
    pub fn assemble(
        config: Config,
        logger: Logger,
        api: Option<Router>,
    ) -> Result<Self, ContainerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let recoverer = PanicRecoverer::new(logger.clone());
        let mut router = HttpRouter::new(logger.clone(), &config.http, recoverer)?;
        if let Some(api) = api {
            router = router.api(api);
        }
        let server = Arc::new(HttpServer::new(
            &config.http,
            logger.clone(),
            router.handler(),
        ));

        Ok(Self {
            config,
            logger,
            server,
        })
    }

    /// Run the server until stopped. A panic in the server task surfaces as
    /// [`ContainerError::Task`].
    ///
    /// The server counts as running as soon as this is first polled, so a
    /// concurrent [`Container::stop`] is never lost to the task's startup.
    pub async fn start(&self) -> Result<(), ContainerError> {
        let claim = self.server.claim()?;
        let server = Arc::clone(&self.server);
        tokio::spawn(async move { server.run(claim).await }).await??;
        Ok(())
    }

    /// Run until `shutdown` resolves, then stop within `grace`.
    ///
    /// A failed stop is returned only after the server task has ended.
    pub async fn serve_until<F>(&self, shutdown: F, grace: Duration) -> Result<(), ContainerError>
    where
        F: Future<Output = ()>,
    {
        let running = self.start();
        tokio::pin!(running);

        tokio::select! {
            // Polled first so the server is claimed before any stop request.
            biased;
            result = &mut running => return result,
            () = shutdown => {}
        }

        let stopped = self.stop(grace).await;
        running.await?;
        stopped
    }

    pub async fn stop(&self, timeout: Duration) -> Result<(), ContainerError> {
        self.server.stop(timeout).await?;
        Ok(())
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr().await
    }
}
