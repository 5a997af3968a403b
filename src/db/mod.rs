//! Replication status source
//!
//! `StatusSource` is the database capability the prober depends on: run one
//! statement, hand back column names and raw text values. The MySQL
//! implementation opens a fresh connection for every call.

mod connection;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::ReplicaSettings;
use crate::protocol::ErrPacket;

pub use connection::ReplicaConnection;

/// Column names plus raw text-protocol rows (`None` is SQL NULL)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Bytes>>>,
}

/// Errors running a status query
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Error {code} ({sql_state}): {message}")]
    Server {
        code: u16,
        sql_state: String,
        message: String,
    },

    #[error("Connection disconnected")]
    Disconnected,

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl QueryError {
    pub(crate) fn from_err_payload(payload: &[u8]) -> Self {
        match ErrPacket::parse(payload) {
            Some(err) => Self::Server {
                code: err.error_code,
                sql_state: err.sql_state,
                message: err.error_message,
            },
            None => Self::Protocol("Malformed ERR packet".into()),
        }
    }
}

/// Something that can run the replication status statement
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn query(&self, sql: &str) -> Result<ResultSet, QueryError>;
}

/// `StatusSource` backed by a live MySQL server
#[derive(Debug, Clone)]
pub struct MySqlStatusSource {
    addr: String,
    user: String,
    password: String,
    /// Bound for connect + query; zero disables the bound
    timeout: Duration,
}

impl MySqlStatusSource {
    pub fn new(settings: &ReplicaSettings) -> Self {
        Self {
            addr: settings.addr(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            timeout: settings.timeout,
        }
    }

    async fn round_trip(&self, sql: &str) -> Result<ResultSet, QueryError> {
        let mut conn = ReplicaConnection::connect(&self.addr, &self.user, &self.password).await?;
        debug!(
            addr = %self.addr,
            server_version = %conn.server_version(),
            sql = %sql,
            "Querying replica status"
        );
        let result = conn.query(sql).await;
        conn.quit().await;
        result
    }
}

#[async_trait]
impl StatusSource for MySqlStatusSource {
    async fn query(&self, sql: &str) -> Result<ResultSet, QueryError> {
        if self.timeout.is_zero() {
            return self.round_trip(sql).await;
        }
        tokio::time::timeout(self.timeout, self.round_trip(sql))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))?
    }
}
