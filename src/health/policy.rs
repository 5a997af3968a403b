//! Health policy evaluation
//!
//! Rules, first match wins:
//! 1. lag column missing or not an integer: unhealthy if the replica is
//!    required to be running, healthy otherwise
//! 2. lag above a non-zero threshold: unhealthy
//! 3. healthy

use std::fmt;

use crate::config::ReplicaSettings;

use super::row::StatusRow;

/// Why a replica was judged unhealthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhealthyReason {
    /// Lag column absent or NULL while the replica must be running
    NotRunning,
    /// Lag above the configured maximum
    LagTooHigh { lag: i64, max: u32 },
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnhealthyReason::NotRunning => f.write_str("replica is not running"),
            UnhealthyReason::LagTooHigh { .. } => f.write_str("replication lag is too high"),
        }
    }
}

/// Outcome of evaluating one status row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthVerdict {
    pub healthy: bool,
    pub reason: Option<UnhealthyReason>,
    pub row: StatusRow,
}

impl HealthVerdict {
    fn healthy(row: StatusRow) -> Self {
        Self {
            healthy: true,
            reason: None,
            row,
        }
    }

    fn unhealthy(row: StatusRow, reason: UnhealthyReason) -> Self {
        Self {
            healthy: false,
            reason: Some(reason),
            row,
        }
    }
}

/// Decide whether a replica is healthy from its status row
pub fn evaluate(row: StatusRow, settings: &ReplicaSettings) -> HealthVerdict {
    let lag_column = settings.replication_syntax.lag_column();
    let lag = row.get(lag_column).and_then(|v| v.as_i64());

    match lag {
        None if settings.fail_replica_not_running => {
            HealthVerdict::unhealthy(row, UnhealthyReason::NotRunning)
        }
        None => HealthVerdict::healthy(row),
        Some(lag)
            if settings.max_seconds_behind_source > 0
                && lag > i64::from(settings.max_seconds_behind_source) =>
        {
            HealthVerdict::unhealthy(
                row,
                UnhealthyReason::LagTooHigh {
                    lag,
                    max: settings.max_seconds_behind_source,
                },
            )
        }
        Some(_) => HealthVerdict::healthy(row),
    }
}
