use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;

/// Top-level configuration: replica name -> replica config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Config {
    pub replicas: BTreeMap<String, ReplicaConfig>,
}

// ============================================================================
// Replica Configuration
// ============================================================================

/// One monitored replica as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    /// MySQL hostname or IP
    #[serde(default = "default_host")]
    pub host: String,
    /// MySQL port
    #[serde(default = "default_port")]
    pub port: u16,
    /// MySQL username
    #[serde(default = "default_user")]
    pub user: String,
    /// MySQL password
    #[serde(default)]
    pub password: String,
    /// Maximum tolerated replication lag in seconds (0 = unlimited)
    #[serde(default, alias = "max_seconds_behind_master")]
    pub max_seconds_behind_source: u32,
    /// Report unhealthy when the lag column is missing or NULL
    #[serde(default, alias = "fail_slave_not_running")]
    pub fail_replica_not_running: bool,
    /// Which status statement the server understands
    #[serde(default)]
    pub replication_syntax: ReplicationSyntax,
    /// Upper bound for connect + status query (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// HTTP listener for this replica
    #[serde(default)]
    pub healthcheck_config: HealthcheckConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_timeout_ms() -> u64 {
    3000
}

/// HTTP listener settings for one replica
#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    /// Listen port (required, 0 means "not set")
    #[serde(default)]
    pub port: u16,
    /// Request path served by the health check
    #[serde(default = "default_path")]
    pub path: String,
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            port: 0,
            path: default_path(),
            listen_addr: default_listen_addr(),
        }
    }
}

/// Replication status statement dialect
///
/// MySQL 8.0.22 renamed `SHOW SLAVE STATUS` to `SHOW REPLICA STATUS` and the
/// lag column along with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationSyntax {
    #[default]
    Replica,
    Slave,
}

impl ReplicationSyntax {
    /// Statement returning the replication status row
    pub fn status_query(&self) -> &'static str {
        match self {
            Self::Replica => "SHOW REPLICA STATUS",
            Self::Slave => "SHOW SLAVE STATUS",
        }
    }

    /// Column holding the replication lag in seconds
    pub fn lag_column(&self) -> &'static str {
        match self {
            Self::Replica => "Seconds_Behind_Source",
            Self::Slave => "Seconds_Behind_Master",
        }
    }
}

// ============================================================================
// Validated Settings
// ============================================================================

/// Validated, immutable settings for one replica endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub max_seconds_behind_source: u32,
    pub fail_replica_not_running: bool,
    pub replication_syntax: ReplicationSyntax,
    pub timeout: Duration,
    pub listen: SocketAddr,
    pub path: String,
}

impl ReplicaSettings {
    /// Validate a config entry
    pub fn from_config(name: &str, config: &ReplicaConfig) -> Result<Self, ConfigError> {
        let healthcheck = &config.healthcheck_config;
        if healthcheck.port == 0 {
            return Err(ConfigError::MissingPort(name.to_string()));
        }

        let path = match healthcheck.path.trim() {
            "" => "/".to_string(),
            p if p.starts_with('/') => p.to_string(),
            p => {
                return Err(ConfigError::InvalidPath {
                    replica: name.to_string(),
                    path: p.to_string(),
                })
            }
        };

        Ok(Self {
            name: name.to_string(),
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            max_seconds_behind_source: config.max_seconds_behind_source,
            fail_replica_not_running: config.fail_replica_not_running,
            replication_syntax: config.replication_syntax,
            timeout: Duration::from_millis(config.timeout_ms),
            listen: SocketAddr::new(healthcheck.listen_addr, healthcheck.port),
            path,
        })
    }

    /// MySQL address (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Validate every replica, failing on the first invalid entry
    pub fn replica_settings(&self) -> Result<Vec<ReplicaSettings>, ConfigError> {
        if self.replicas.is_empty() {
            return Err(ConfigError::Empty);
        }
        self.replicas
            .iter()
            .map(|(name, replica)| ReplicaSettings::from_config(name, replica))
            .collect()
    }
}
