//! Replica health evaluation
//!
//! This module provides:
//! - Normalization of raw status rows into typed values
//! - The lag / running-state health policy
//! - The on-demand probe tying a status source to the policy

mod policy;
mod prober;
mod row;

pub use policy::{evaluate, HealthVerdict, UnhealthyReason};
pub use prober::{probe, ProbeError};
pub use row::{normalize, StatusRow, StatusValue};
