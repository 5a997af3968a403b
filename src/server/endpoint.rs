//! Per-replica HTTP health check endpoint
//!
//! One listener per replica. Every request to the configured path runs a
//! fresh probe: healthy replicas get 200 with the status row as JSON,
//! probe errors and unhealthy verdicts get 500 with a plain-text reason.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReplicaSettings;
use crate::db::StatusSource;
use crate::health::probe;

/// Time allowed for a client to send request headers
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Time in-flight requests get to finish once shutdown starts
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of one listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

/// Listener failure outside of a requested shutdown
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("server {replica} failed to listen on {addr}: {source}")]
    Bind {
        replica: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Health check endpoint for one replica, not yet listening
pub struct Endpoint {
    handler: Arc<HealthHandler>,
    state: watch::Sender<ListenerState>,
    shutdown_grace: Duration,
}

impl Endpoint {
    pub fn new(settings: ReplicaSettings, source: Arc<dyn StatusSource>) -> Self {
        let (state, _) = watch::channel(ListenerState::Starting);
        Self {
            handler: Arc::new(HealthHandler {
                settings: Arc::new(settings),
                source,
            }),
            state,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }

    /// Override how long in-flight requests may run after shutdown starts
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn settings(&self) -> &ReplicaSettings {
        &self.handler.settings
    }

    /// Watch listener state transitions
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Bind the listen address
    pub async fn bind(self) -> Result<BoundEndpoint, ListenerError> {
        let addr = self.settings().listen;
        let bound = TcpListener::bind(addr)
            .await
            .and_then(|listener| listener.local_addr().map(|local| (listener, local)));

        match bound {
            Ok((listener, local_addr)) => {
                info!(
                    replica = %self.settings().name,
                    addr = %local_addr,
                    path = %self.settings().path,
                    "Health check listening"
                );
                self.state.send_replace(ListenerState::Serving);
                Ok(BoundEndpoint {
                    endpoint: self,
                    listener,
                    local_addr,
                })
            }
            Err(source) => {
                self.state.send_replace(ListenerState::Stopped);
                Err(ListenerError::Bind {
                    replica: self.settings().name.clone(),
                    addr,
                    source,
                })
            }
        }
    }
}

/// Endpoint with a bound listener
pub struct BoundEndpoint {
    endpoint: Endpoint,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundEndpoint {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, then drain
    ///
    /// Connections still open when the grace period ends are aborted, so
    /// no request outlives the `Stopped` state.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ListenerError> {
        let Self {
            endpoint,
            listener,
            local_addr,
        } = self;
        let replica = endpoint.handler.settings.name.clone();

        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(READ_TIMEOUT);
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                // Reap finished connections
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
                accepted = listener.accept() => match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        error!(replica = %replica, error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let handler = endpoint.handler.clone();
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.handle(req).await) }
            });
            let conn = graceful.watch(http.serve_connection(TokioIo::new(stream), service));

            let replica = replica.clone();
            connections.spawn(async move {
                if let Err(e) = conn.await {
                    debug!(replica = %replica, peer = %peer, error = %e, "Connection error");
                }
            });
        }

        endpoint.state.send_replace(ListenerState::ShuttingDown);
        info!(replica = %replica, addr = %local_addr, "Health check shutting down");
        drop(listener);

        let grace = endpoint.shutdown_grace;
        tokio::select! {
            _ = graceful.shutdown() => {
                debug!(replica = %replica, "All connections drained");
            }
            _ = tokio::time::sleep(grace) => {
                warn!(
                    replica = %replica,
                    grace = ?grace,
                    open = connections.len(),
                    "Shutdown grace period elapsed, aborting connections"
                );
            }
        }
        connections.shutdown().await;

        endpoint.state.send_replace(ListenerState::Stopped);
        info!(replica = %replica, "Health check stopped");
        Ok(())
    }
}

/// Request handler shared by all connections of one endpoint
pub(crate) struct HealthHandler {
    settings: Arc<ReplicaSettings>,
    source: Arc<dyn StatusSource>,
}

impl HealthHandler {
    pub(crate) async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let method = req.method();
        let path = req.uri().path();

        if !path_matches(&self.settings.path, path) {
            return text_response(StatusCode::NOT_FOUND, "404 page not found");
        }
        if method != Method::GET && method != Method::HEAD {
            let mut resp = text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            resp.headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return resp;
        }

        let reason = match probe(&self.settings, self.source.as_ref()).await {
            Ok(verdict) if verdict.healthy => match serde_json::to_vec(&verdict.row) {
                Ok(body) => {
                    info!(
                        replica = %self.settings.name,
                        method = %method,
                        path = %path,
                        status = 200,
                        "Health check passed"
                    );
                    return json_response(body);
                }
                Err(e) => e.to_string(),
            },
            Ok(verdict) => verdict
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "replica is unhealthy".to_string()),
            Err(e) => e.to_string(),
        };

        warn!(
            replica = %self.settings.name,
            method = %method,
            path = %path,
            status = 500,
            error = %reason,
            "Health check failed"
        );
        text_response(StatusCode::INTERNAL_SERVER_ERROR, &reason)
    }
}

/// A path ending in `/` matches its whole subtree, anything else matches exactly
fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        path == pattern
    }
}

fn json_response(mut body: Vec<u8>) -> Response<Full<Bytes>> {
    body.push(b'\n');
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(format!("{}\n", message))));
    *resp.status_mut() = status;
    let headers = resp.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    resp
}
