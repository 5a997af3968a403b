//! Fleet of health check listeners
//!
//! All listeners share one cancellation token. The first listener that
//! fails cancels it, every other listener drains and stops, and `run`
//! reports that first failure. Cancelling the token from outside (a
//! termination signal) stops the fleet cleanly.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError};
use crate::db::MySqlStatusSource;

use super::endpoint::{Endpoint, ListenerError, ListenerState};
use super::signal;

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("listener task failed: {0}")]
    Task(String),
}

pub struct Fleet {
    endpoints: Vec<Endpoint>,
    shutdown: CancellationToken,
}

impl Fleet {
    /// Validate every replica and build one MySQL-backed endpoint each
    ///
    /// Nothing is bound here; an invalid entry fails the whole fleet.
    pub fn from_config(config: &Config) -> Result<Self, FleetError> {
        let endpoints = config
            .replica_settings()?
            .into_iter()
            .map(|settings| {
                let source = Arc::new(MySqlStatusSource::new(&settings));
                Endpoint::new(settings, source)
            })
            .collect();
        Self::new(endpoints)
    }

    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, FleetError> {
        if endpoints.is_empty() {
            return Err(ConfigError::Empty.into());
        }
        if let Some(endpoint) = endpoints.iter().find(|e| e.settings().listen.port() == 0) {
            return Err(ConfigError::MissingPort(endpoint.settings().name.clone()).into());
        }
        Ok(Self {
            endpoints,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Token that stops every listener when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Per-replica listener state
    pub fn states(&self) -> Vec<(String, watch::Receiver<ListenerState>)> {
        self.endpoints
            .iter()
            .map(|e| (e.settings().name.clone(), e.state()))
            .collect()
    }

    /// Run until a termination signal arrives or a listener fails
    pub async fn run_until_signal(self) -> Result<(), FleetError> {
        let shutdown = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                _ = signal::shutdown_signal() => shutdown.cancel(),
                _ = shutdown.cancelled() => {}
            }
        });
        let result = self.run().await;
        watcher.abort();
        result
    }

    /// Serve every endpoint until the shutdown token is cancelled
    ///
    /// Returns only after every listener has stopped.
    pub async fn run(self) -> Result<(), FleetError> {
        let Fleet {
            endpoints,
            shutdown,
        } = self;

        let mut tasks = JoinSet::new();
        for endpoint in endpoints {
            let name = endpoint.settings().name.clone();
            info!(
                replica = %name,
                mysql = %endpoint.settings().addr(),
                listen = %endpoint.settings().listen,
                "Creating health check"
            );
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let result = match endpoint.bind().await {
                    Ok(bound) => bound.serve(shutdown).await,
                    Err(e) => Err(e),
                };
                (name, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((name, Err(e))) => {
                    error!(replica = %name, error = %e, "Listener failed");
                    FleetError::Listener(e)
                }
                Err(e) => {
                    error!(error = %e, "Listener task failed");
                    FleetError::Task(e.to_string())
                }
            };
            if !shutdown.is_cancelled() {
                warn!("Stopping all listeners");
                shutdown.cancel();
            }
            first_error.get_or_insert(failure);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("All listeners stopped");
                Ok(())
            }
        }
    }
}
