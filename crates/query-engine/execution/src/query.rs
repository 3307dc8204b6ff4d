//! Send statements over a chain's connection.

use tracing::{debug_span, Instrument};

use query_engine_sql::sql::string::SQL;

use crate::driver::Row;
use crate::error::{QueryError, Result, UsageError};
use crate::execution::{self, Chain};
use crate::mask::{QueryResult, ResultMask};
use crate::stack::FrameId;

/// Execute a query for an open context and shape the rows by the mask.
pub(crate) async fn execute(
    chain: &Chain,
    frame: FrameId,
    statement: &SQL,
    mask: ResultMask,
) -> Result<QueryResult> {
    if !chain.stack.is_open(frame) {
        return Err(UsageError::ContextClosed.into());
    }
    // the context may settle while the statement is in flight
    let _hold = chain.lease.hold()?;
    let rows = send(chain, statement).await?;
    let result = mask.interpret(rows).map_err(|err| {
        tracing::debug!(%mask, error = %err, "unexpected row count");
        err
    })?;
    Ok(result)
}

/// Send one statement to the driver, first rolling back a transaction that
/// was abandoned on the connection.
pub(crate) async fn send(chain: &Chain, statement: &SQL) -> Result<Vec<Row>, QueryError> {
    if chain.has_abandoned_transaction() {
        execution::rollback_abandoned(chain).await;
    }
    dispatch(chain, statement).await
}

pub(crate) async fn dispatch(chain: &Chain, statement: &SQL) -> Result<Vec<Row>, QueryError> {
    if let Some(metrics) = &chain.engine.metrics {
        metrics.query_total.inc();
    }

    let result = chain
        .lease
        .connection()
        .execute(statement)
        .instrument(debug_span!(
            "Execute query",
            sql = %statement.sql,
            params = statement.params.len(),
        ))
        .await;

    if let Err(err) = &result {
        if let Some(metrics) = &chain.engine.metrics {
            metrics.query_errors_total.inc();
        }
        tracing::debug!(sql = %statement.sql, code = ?err.code, error = %err, "query failed");
    }
    result
}
