//! Health check for the configured database.

use query_engine_execution::{Database, Error};

use crate::state::State;

/// Check that a connection can be leased and answers a trivial query.
pub async fn health_check(database: &Database) -> Result<(), Error> {
    let row = database.one("select 1 as ok").await?;
    match row.get("ok").and_then(serde_json::Value::as_i64) {
        Some(1) => Ok(()),
        other => {
            tracing::error!(
                meta.signal_type = "log",
                event.domain = "pgtx",
                event.name = "Health check error",
                name = "Health check error",
                body = ?other,
                error = true,
            );
            Err(Error::msg(format!(
                "health check returned an unexpected value: {other:?}"
            )))
        }
    }
}

/// Run the health check and refresh the pool gauges.
pub async fn check_state(state: &State) -> Result<(), Error> {
    let result = health_check(&state.database).await;
    state.pool_metrics.update(&state.pool);
    result
}
