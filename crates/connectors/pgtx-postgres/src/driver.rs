//! The engine's driver boundary implemented over a sqlx pool.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;
use tracing::Instrument;

use query_engine_execution::{Connection, ConnectionError, Driver, QueryError, Row};
use query_engine_sql::sql::string::SQL;

use crate::convert;

/// Leases pooled PostgreSQL connections to the engine.
#[derive(Debug, Clone)]
pub struct PgDriver {
    pool: PgPool,
}

impl PgDriver {
    pub fn new(pool: PgPool) -> PgDriver {
        PgDriver { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn acquire(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let connection = self
            .pool
            .acquire()
            .instrument(tracing::debug_span!("Acquire connection"))
            .await
            .map_err(|err| ConnectionError::new(err.to_string()))?;
        Ok(Box::new(PgConnection {
            connection: Mutex::new(Some(connection)),
            in_transaction: AtomicBool::new(false),
        }))
    }
}

/// A pooled connection. Statements from sibling operations queue on the mutex.
struct PgConnection {
    connection: Mutex<Option<PoolConnection<Postgres>>>,
    in_transaction: AtomicBool,
}

#[async_trait]
impl Connection for PgConnection {
    async fn execute(&self, statement: &SQL) -> Result<Vec<Row>, QueryError> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| QueryError::new("the connection has been released"))?;

        let verb = statement
            .sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        // assume BEGIN took effect even if this call is abandoned half way
        if verb == "begin" {
            self.in_transaction.store(true, Ordering::SeqCst);
        }

        let rows = convert::build_query_with_params(statement)
            .fetch_all(&mut **connection)
            .await
            .map_err(|err| {
                if verb == "begin" {
                    self.in_transaction.store(false, Ordering::SeqCst);
                }
                query_error(err)
            })?;

        if verb == "commit" || verb == "rollback" {
            self.in_transaction.store(false, Ordering::SeqCst);
        }

        rows.iter().map(convert::row_to_json).collect()
    }

    fn release(&self) {
        let Ok(mut guard) = self.connection.try_lock() else {
            // a statement is still in flight; Drop hands the connection back
            tracing::warn!("connection released while a statement was running");
            return;
        };
        let Some(connection) = guard.take() else {
            return;
        };
        discard(connection, self.in_transaction.load(Ordering::SeqCst));
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            discard(connection, *self.in_transaction.get_mut());
        }
    }
}

/// Return a connection to the pool, or close it when a transaction is still open on it.
fn discard(connection: PoolConnection<Postgres>, in_transaction: bool) {
    if in_transaction {
        tracing::warn!("closing a connection released inside an open transaction");
        drop(connection.detach());
    } else {
        drop(connection);
    }
}

fn query_error(err: sqlx::Error) -> QueryError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let error = QueryError::new(db_err.message());
            match db_err.code() {
                Some(code) => error.with_code(code),
                None => error,
            }
        }
        _ => QueryError::new(err.to_string()),
    }
}
