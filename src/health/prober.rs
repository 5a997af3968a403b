use tracing::debug;

use crate::config::ReplicaSettings;
use crate::db::{QueryError, StatusSource};

use super::policy::{evaluate, HealthVerdict};
use super::row::normalize;

/// Error during a probe
///
/// An unhealthy verdict is not an error; these are the cases where no
/// verdict could be reached at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("no replica status: replication is not running or not configured on this instance")]
    NoStatus,
}

/// Run the status query once and evaluate the first row
pub async fn probe(
    settings: &ReplicaSettings,
    source: &dyn StatusSource,
) -> Result<HealthVerdict, ProbeError> {
    let sql = settings.replication_syntax.status_query();
    let result = source.query(sql).await?;

    let Some(values) = result.rows.first() else {
        return Err(ProbeError::NoStatus);
    };
    if result.rows.len() > 1 {
        // Multi-source replication returns one row per channel
        debug!(
            replica = %settings.name,
            rows = result.rows.len(),
            "Multiple status rows, evaluating the first"
        );
    }

    let row = normalize(&result.columns, values);
    Ok(evaluate(row, settings))
}
