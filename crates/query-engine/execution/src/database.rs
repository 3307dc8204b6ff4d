//! The root object: starts chains on fresh connections.

use std::future::Future;
use std::sync::Arc;

use query_engine_sql::sql::string::SQL;
use query_engine_sql::sql::transaction::TransactionMode;

use crate::adapter::{DynamicCallback, PromiseAdapter};
use crate::context::{Context, ContextOptions};
use crate::driver::{Driver, Row};
use crate::error::{Result, UsageError};
use crate::execution::{self, Chain, Engine};
use crate::mask::{IntoResultMask, QueryResult};
use crate::metrics::Metrics;
use crate::stack::ContextKind;

/// Engine settings for a [`Database`].
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Send transaction-control statements in upper case.
    pub capitalize_sql: bool,
    /// Mode used by transactions opened without one.
    pub default_mode: TransactionMode,
    pub metrics: Option<Metrics>,
    pub adapter: PromiseAdapter,
}

/// Entry point for running tasks, transactions and one-off queries.
///
/// Every call on the root leases its own connection, released when the
/// outermost context settles.
#[derive(Clone)]
pub struct Database {
    engine: Arc<Engine>,
}

impl Database {
    pub fn new(driver: Arc<dyn Driver>) -> Database {
        Database::with_options(driver, DatabaseOptions::default())
    }

    pub fn with_options(driver: Arc<dyn Driver>, options: DatabaseOptions) -> Database {
        Database {
            engine: Arc::new(Engine {
                driver,
                metrics: options.metrics,
                capitalize_sql: options.capitalize_sql,
                default_mode: options.default_mode,
                adapter: options.adapter,
            }),
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.engine.metrics.as_ref()
    }

    pub async fn task<T, F, Fut>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.task_with(ContextOptions::default(), callback).await
    }

    pub async fn task_with<T, F, Fut>(
        &self,
        options: impl Into<ContextOptions>,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let chain = Chain::acquire(&self.engine).await?;
        execution::run(chain, None, ContextKind::Task, options.into(), callback).await
    }

    pub async fn tx<T, F, Fut>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.tx_with(ContextOptions::default(), callback).await
    }

    /// Run `callback` in a transaction. `options` may be a [`TransactionMode`],
    /// a tag, or full [`ContextOptions`].
    pub async fn tx_with<T, F, Fut>(
        &self,
        options: impl Into<ContextOptions>,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let chain = Chain::acquire(&self.engine).await?;
        execution::run(chain, None, ContextKind::Transaction, options.into(), callback).await
    }

    /// Run a callback assembled at runtime. A missing callback is rejected
    /// before any connection is leased.
    pub async fn run_dynamic(
        &self,
        kind: ContextKind,
        callback: Option<DynamicCallback>,
    ) -> Result<serde_json::Value> {
        let callback = callback.ok_or(UsageError::MissingCallback(kind))?;
        let chain = Chain::acquire(&self.engine).await?;
        execution::run_dynamic(chain, None, kind, ContextOptions::default(), callback).await
    }

    /// Run one query in an implicit task.
    pub async fn query(
        &self,
        statement: impl Into<SQL>,
        mask: impl IntoResultMask,
    ) -> Result<QueryResult> {
        let mask = mask.into_mask()?;
        let statement = statement.into();
        self.task(|context| async move { context.query(statement, mask).await })
            .await
    }

    pub async fn none(&self, statement: impl Into<SQL>) -> Result<()> {
        let statement = statement.into();
        self.task(|context| async move { context.none(statement).await })
            .await
    }

    pub async fn one(&self, statement: impl Into<SQL>) -> Result<Row> {
        let statement = statement.into();
        self.task(|context| async move { context.one(statement).await })
            .await
    }

    pub async fn one_or_none(&self, statement: impl Into<SQL>) -> Result<Option<Row>> {
        let statement = statement.into();
        self.task(|context| async move { context.one_or_none(statement).await })
            .await
    }

    pub async fn many(&self, statement: impl Into<SQL>) -> Result<Vec<Row>> {
        let statement = statement.into();
        self.task(|context| async move { context.many(statement).await })
            .await
    }

    pub async fn many_or_none(&self, statement: impl Into<SQL>) -> Result<Vec<Row>> {
        let statement = statement.into();
        self.task(|context| async move { context.many_or_none(statement).await })
            .await
    }

    pub async fn any(&self, statement: impl Into<SQL>) -> Result<Vec<Row>> {
        let statement = statement.into();
        self.task(|context| async move { context.any(statement).await })
            .await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("capitalize_sql", &self.engine.capitalize_sql)
            .field("default_mode", &self.engine.default_mode)
            .finish_non_exhaustive()
    }
}
