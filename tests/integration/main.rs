//! Integration test entry point
//!
//! Most tests run against an in-process fake MySQL server. Tests against a
//! real replica are opt-in:
//!
//! Run with: REPLICA_CHECK_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - REPLICA_CHECK_RUN_INTEGRATION_TESTS: Set to "1" to enable live tests
//! - REPLICA_CHECK_MYSQL_HOST: Replica host (default: 127.0.0.1)
//! - REPLICA_CHECK_MYSQL_PORT: Replica port (default: 3306)
//! - REPLICA_CHECK_MYSQL_USER: Monitoring user (default: root)
//! - REPLICA_CHECK_MYSQL_PASS: Monitoring password (default: empty)

mod http;

use std::env;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use replica_healthcheck::config::{Config, ReplicaSettings};

/// Check if live tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("REPLICA_CHECK_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if live tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!(
                "Skipping integration test (set REPLICA_CHECK_RUN_INTEGRATION_TESTS=1 to run)"
            );
            return;
        }
    };
}

/// Live replica connection config from environment
#[derive(Debug, Clone)]
pub struct MysqlTestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

pub fn get_mysql_config() -> MysqlTestConfig {
    MysqlTestConfig {
        host: env::var("REPLICA_CHECK_MYSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: env::var("REPLICA_CHECK_MYSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306),
        user: env::var("REPLICA_CHECK_MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("REPLICA_CHECK_MYSQL_PASS").unwrap_or_default(),
    }
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Replica config entry in YAML, listening on loopback
pub fn replica_yaml(
    name: &str,
    mysql_port: u16,
    password: &str,
    http_port: u16,
    extra: &str,
) -> String {
    format!(
        "{name}:\n  host: 127.0.0.1\n  port: {mysql_port}\n  user: monitor\n  password: \"{password}\"\n  timeout_ms: 2000\n{extra}  healthcheck_config:\n    port: {http_port}\n    listen_addr: 127.0.0.1\n"
    )
}

pub fn parse_config(yaml: &str) -> Config {
    serde_yaml::from_str(yaml).unwrap()
}

pub fn settings(yaml: &str) -> ReplicaSettings {
    parse_config(yaml).replica_settings().unwrap().remove(0)
}

/// One GET over a fresh connection
pub async fn http_get(addr: SocketAddr, path: &str) -> (StatusCode, String) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let req = Request::get(path)
        .header("host", addr.to_string())
        .body(Empty::<Bytes>::new())
        .unwrap();
    let resp = sender.send_request(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
