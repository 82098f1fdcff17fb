//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;
use workout::config::{Config, HttpConfig};
use workout::lifecycle::{Container, ContainerError};
use workout::Logger;

/// In-memory log sink shared between the logger and the test.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn entries(&self) -> Vec<Value> {
        self.contents()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|entry| entry["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// A container serving on an ephemeral loopback port.
pub struct TestService {
    pub container: Arc<Container>,
    pub running: JoinHandle<Result<(), ContainerError>>,
    pub addr: SocketAddr,
    pub logs: CapturedLogs,
}

impl TestService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a container on `127.0.0.1:0` with `api` mounted under `/api`.
pub async fn start_service(api: Option<Router>) -> TestService {
    let config = Config {
        log_level: "info".to_string(),
        http: HttpConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..HttpConfig::default()
        },
    };
    start_service_with(config, api).await
}

pub async fn start_service_with(config: Config, api: Option<Router>) -> TestService {
    let logs = CapturedLogs::default();
    let logger = Logger::with_writer(&config.log_level, logs.clone()).unwrap();
    let container = Arc::new(Container::assemble(config, logger, api).unwrap());

    let running = tokio::spawn({
        let container = Arc::clone(&container);
        async move { container.start().await }
    });
    let addr = container.local_addr().await.expect("server failed to bind");

    TestService {
        container,
        running,
        addr,
        logs,
    }
}
