//! MySQL replica health check agent
//!
//! Runs one HTTP listener per configured replica. Each request queries the
//! replica's replication status and answers 200 (healthy, status row as
//! JSON) or 500 (plain-text reason). Listeners start together and stop
//! together.

pub mod config;
pub mod db;
pub mod health;
pub mod protocol;
pub mod server;
