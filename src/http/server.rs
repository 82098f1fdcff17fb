//! HTTP server lifecycle.
//!
//! # Responsibilities
//! - Bind the configured address and accept connections
//! - Serve HTTP/1.1 and HTTP/2 through hyper-util's auto builder
//! - Enforce the header, body, response and idle timeouts
//! - Drain connections on stop, aborting whatever outlives the deadline
//!
//! # Design Decisions
//! - `start` owns the accept loop; `stop` talks to it over a channel and
//!   waits for the drain result
//! - Every connection runs in a `JoinSet` so a missed deadline can abort
//!   the stragglers in one call

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::{body::Body, http::Request, response::Response, BoxError, Router};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};

use crate::config::HttpConfig;
use crate::http::recoverer::{is_aborted, HandlerAborted};
use crate::net::connection::{ConnectionTracker, IdleTimeout};
use crate::observability::logging::{error, string, uint64, Logger};

pub const READ_HEADER_TIMEOUT: Duration = Duration::from_secs(20);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server already started")]
    AlreadyStarted,
    #[error("server is not running")]
    NotRunning,
    #[error("connections still open after the {0:?} shutdown deadline")]
    ShutdownTimeout(Duration),
    #[error("server exited before the stop completed")]
    Stopped,
}

/// Permission to run the accept loop, taken by [`HttpServer::claim`].
///
/// While a claim is outstanding the server counts as running, so a `stop`
/// issued before the accept loop binds is queued rather than rejected.
pub struct StartClaim {
    stop_rx: mpsc::Receiver<StopRequest>,
}

struct StopRequest {
    timeout: Duration,
    done: oneshot::Sender<Result<(), ServerError>>,
}

enum Lifecycle {
    Idle(mpsc::Receiver<StopRequest>),
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listening {
    Pending,
    Bound(SocketAddr),
    Closed,
}

/// HTTP server bound to one address.
pub struct HttpServer {
    addr: String,
    logger: Logger,
    handler: Router,
    lifecycle: Mutex<Lifecycle>,
    stop_tx: mpsc::Sender<StopRequest>,
    listening: watch::Sender<Listening>,
}

impl HttpServer {
    #[allow(deprecated)]
    pub fn new(config: &HttpConfig, logger: Logger, handler: Router) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (listening, _) = watch::channel(Listening::Pending);

        let handler = handler
            .layer(TimeoutLayer::new(WRITE_TIMEOUT))
            .layer(RequestBodyTimeoutLayer::new(READ_TIMEOUT));

        Self {
            addr: config.socket_address(),
            logger,
            handler,
            lifecycle: Mutex::new(Lifecycle::Idle(stop_rx)),
            stop_tx,
            listening,
        }
    }

    /// Accept connections until [`HttpServer::stop`] is called.
    ///
    /// Returns `Ok(())` once stopped, whatever the drain outcome; the drain
    /// result goes to the caller of `stop`.
    pub async fn start(&self) -> Result<(), ServerError> {
        let claim = self.claim()?;
        self.run(claim).await
    }

    /// Mark the server as running ahead of [`HttpServer::run`], for callers
    /// that run the accept loop on another task.
    pub fn claim(&self) -> Result<StartClaim, ServerError> {
        Ok(StartClaim {
            stop_rx: self.begin()?,
        })
    }

    /// Accept connections under `claim` until stopped.
    pub async fn run(&self, claim: StartClaim) -> Result<(), ServerError> {
        let mut stop_rx = claim.stop_rx;

        let listener = match TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.finish();
                return Err(ServerError::Bind {
                    addr: self.addr.clone(),
                    source,
                });
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(source) => {
                self.finish();
                return Err(ServerError::Bind {
                    addr: self.addr.clone(),
                    source,
                });
            }
        };
        self.listening.send_replace(Listening::Bound(local));
        self.logger
            .info("Starting the server.", &[string("address", local.to_string())]);

        let (drain_tx, drain_rx) = watch::channel(());
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        let request = loop {
            tokio::select! {
                request = stop_rx.recv() => break request,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.serve(stream, peer, &tracker, drain_rx.clone(), &mut connections);
                    }
                    Err(err) => {
                        self.logger.warn("Failed to accept connection.", &[error(&err)]);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
            while connections.try_join_next().is_some() {}
        };
        drop(listener);

        drain_tx.send_replace(());
        let deadline = request.as_ref().map(|request| request.timeout);
        let result = self.drain(&mut connections, &tracker, deadline).await;

        self.finish();
        if let Some(request) = request {
            // The caller may have given up waiting.
            let _ = request.done.send(result);
        }
        Ok(())
    }

    /// Stop accepting, drain connections, and wait up to `timeout` for them.
    pub async fn stop(&self, timeout: Duration) -> Result<(), ServerError> {
        self.logger.info("Stopping the server.", &[]);

        let result = self.request_stop(timeout).await;
        if let Err(err) = &result {
            self.logger
                .error("Error while shutting down the server.", &[error(err)]);
        }
        result
    }

    /// Bound address, waiting for `start` to bind. `None` once the server
    /// failed to bind or has stopped.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut listening = self.listening.subscribe();
        let state = listening
            .wait_for(|state| *state != Listening::Pending)
            .await
            .map(|state| *state)
            .unwrap_or(Listening::Closed);

        match state {
            Listening::Bound(addr) => Some(addr),
            Listening::Pending | Listening::Closed => None,
        }
    }

    fn begin(&self) -> Result<mpsc::Receiver<StopRequest>, ServerError> {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match std::mem::replace(&mut *lifecycle, Lifecycle::Running) {
            Lifecycle::Idle(stop_rx) => Ok(stop_rx),
            previous => {
                *lifecycle = previous;
                Err(ServerError::AlreadyStarted)
            }
        }
    }

    fn finish(&self) {
        *self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Lifecycle::Stopped;
        self.listening.send_replace(Listening::Closed);
    }

    fn is_running(&self) -> bool {
        matches!(
            *self
                .lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Running
        )
    }

    async fn request_stop(&self, timeout: Duration) -> Result<(), ServerError> {
        if !self.is_running() {
            return Err(ServerError::NotRunning);
        }

        let (done, done_rx) = oneshot::channel();
        self.stop_tx
            .send(StopRequest { timeout, done })
            .await
            .map_err(|_| ServerError::NotRunning)?;
        done_rx.await.map_err(|_| ServerError::Stopped)?
    }

    fn serve(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        tracker: &ConnectionTracker,
        mut drain: watch::Receiver<()>,
        connections: &mut JoinSet<()>,
    ) {
        if let Err(err) = stream.set_nodelay(true) {
            self.logger.debug("Failed to set TCP_NODELAY.", &[error(&err)]);
        }

        let guard = tracker.track();
        let logger = self.logger.clone();
        let service = TowerToHyperService::new(
            self.handler
                .clone()
                .map_request(|request: Request<Incoming>| request.map(Body::new))
                .map_result(abandon_aborted),
        );

        connections.spawn(async move {
            let mut builder = Builder::new(TokioExecutor::new());
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(READ_HEADER_TIMEOUT);

            let io = TokioIo::new(IdleTimeout::new(stream, IDLE_TIMEOUT));
            let connection = builder.serve_connection_with_upgrades(io, service);
            tokio::pin!(connection);

            let mut draining = false;
            loop {
                tokio::select! {
                    result = connection.as_mut() => {
                        if let Err(err) = result {
                            logger.debug(
                                "Connection closed with error.",
                                &[
                                    string("connection", guard.id().to_string()),
                                    string("peer", peer.to_string()),
                                    error(&*err),
                                ],
                            );
                        }
                        break;
                    }
                    _ = drain.changed(), if !draining => {
                        draining = true;
                        connection.as_mut().graceful_shutdown();
                    }
                }
            }
            drop(guard);
        });
    }

    async fn drain(
        &self,
        connections: &mut JoinSet<()>,
        tracker: &ConnectionTracker,
        deadline: Option<Duration>,
    ) -> Result<(), ServerError> {
        let Some(deadline) = deadline else {
            connections.abort_all();
            while connections.join_next().await.is_some() {}
            return Ok(());
        };

        let drained = tokio::time::timeout(deadline, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            self.logger.warn(
                "Closing connections that outlived the shutdown deadline.",
                &[uint64("connections", tracker.active_count())],
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
            return Err(ServerError::ShutdownTimeout(deadline));
        }
        Ok(())
    }
}

/// Turn an aborted handler's response into a service error, which makes
/// hyper close the connection without writing anything.
fn abandon_aborted(result: Result<Response, Infallible>) -> Result<Response, BoxError> {
    match result {
        Ok(response) if is_aborted(&response) => Err(HandlerAborted.into()),
        Ok(response) => Ok(response),
        Err(never) => match never {},
    }
}
