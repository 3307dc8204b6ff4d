//! The handle a unit of work receives: query methods, nesting, combinators.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use query_engine_sql::sql::string::SQL;
use query_engine_sql::sql::transaction::TransactionMode;

use crate::adapter::{DynamicCallback, Returned};
use crate::combinators::{
    self, BatchError, PageError, PageOptions, PageSummary, SequenceError, SequenceOptions,
};
use crate::driver::Row;
use crate::error::{Error, Result, RowCountError, UsageError};
use crate::execution::{self, Chain};
use crate::lease::LeaseKey;
use crate::mask::{IntoResultMask, QueryResult, ResultMask};
use crate::query;
use crate::stack::{ContextKind, FrameId, FrameInfo};

/// Options for opening a task or a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    /// Free-form label attached to the context's span and info.
    pub tag: Option<String>,
    /// Transaction mode for BEGIN. Ignored by tasks and by transactions
    /// nested inside an open one.
    pub mode: Option<TransactionMode>,
}

impl ContextOptions {
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> ContextOptions {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: TransactionMode) -> ContextOptions {
        self.mode = Some(mode);
        self
    }
}

impl From<TransactionMode> for ContextOptions {
    fn from(mode: TransactionMode) -> ContextOptions {
        ContextOptions {
            tag: None,
            mode: Some(mode),
        }
    }
}

impl From<&str> for ContextOptions {
    fn from(tag: &str) -> ContextOptions {
        ContextOptions {
            tag: Some(tag.to_string()),
            mode: None,
        }
    }
}

/// Where a context sits in its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub kind: ContextKind,
    pub tag: Option<String>,
    /// Nesting depth, 0 for the context opened on the database root.
    pub level: usize,
    /// Depth among transactions, `None` outside any transaction.
    pub tx_level: Option<usize>,
    pub in_transaction: bool,
    pub connection: LeaseKey,
    pub started: Instant,
}

/// An open task or transaction.
///
/// Cloning is cheap and every clone addresses the same context. Once the
/// context settles its methods fail with [`UsageError::ContextClosed`].
#[derive(Clone)]
pub struct Context {
    chain: Arc<Chain>,
    frame: FrameId,
    info: Arc<FrameInfo>,
}

impl Context {
    pub(crate) fn new(chain: Arc<Chain>, frame: FrameId, info: FrameInfo) -> Context {
        Context {
            chain,
            frame,
            info: Arc::new(info),
        }
    }

    pub fn info(&self) -> ContextInfo {
        let frame = &self.info;
        ContextInfo {
            kind: frame.kind,
            tag: frame.tag.clone(),
            level: frame.level,
            tx_level: frame.tx_level,
            in_transaction: frame.tx_level.is_some(),
            connection: self.chain.lease.key(),
            started: frame.started,
        }
    }

    pub fn is_open(&self) -> bool {
        self.chain.stack.is_open(self.frame)
    }

    /// Run a query and shape its rows by `mask`. The mask is validated before
    /// anything is sent.
    pub async fn query(
        &self,
        statement: impl Into<SQL>,
        mask: impl IntoResultMask,
    ) -> Result<QueryResult> {
        let mask = mask.into_mask()?;
        query::execute(&self.chain, self.frame, &statement.into(), mask).await
    }

    /// A query that must not return rows.
    pub async fn none(&self, statement: impl Into<SQL>) -> Result<()> {
        self.query(statement, ResultMask::NONE).await?;
        Ok(())
    }

    /// A query that must return exactly one row.
    pub async fn one(&self, statement: impl Into<SQL>) -> Result<Row> {
        self.query(statement, ResultMask::ONE)
            .await?
            .into_row()
            .ok_or(Error::RowCount(RowCountError::NoRows))
    }

    pub async fn one_or_none(&self, statement: impl Into<SQL>) -> Result<Option<Row>> {
        Ok(self.query(statement, ResultMask::ONE_OR_NONE).await?.into_row())
    }

    pub async fn many(&self, statement: impl Into<SQL>) -> Result<Vec<Row>> {
        Ok(self.query(statement, ResultMask::MANY).await?.into_rows())
    }

    pub async fn many_or_none(&self, statement: impl Into<SQL>) -> Result<Vec<Row>> {
        Ok(self.query(statement, ResultMask::MANY_OR_NONE).await?.into_rows())
    }

    pub async fn any(&self, statement: impl Into<SQL>) -> Result<Vec<Row>> {
        Ok(self.query(statement, ResultMask::ANY).await?.into_rows())
    }

    /// Open a nested task on this context's connection.
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
        self.nested(ContextKind::Task, options.into(), callback).await
    }

    /// Open a nested transaction. Inside an open transaction it issues no
    /// statements of its own; its failure rolls back the whole transaction.
    pub async fn tx<T, F, Fut>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.tx_with(ContextOptions::default(), callback).await
    }

    pub async fn tx_with<T, F, Fut>(
        &self,
        options: impl Into<ContextOptions>,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.nested(ContextKind::Transaction, options.into(), callback)
            .await
    }

    /// Open a nested context for a callback assembled at runtime.
    pub async fn run_dynamic(
        &self,
        kind: ContextKind,
        callback: Option<DynamicCallback>,
    ) -> Result<serde_json::Value> {
        let callback = callback.ok_or(UsageError::MissingCallback(kind))?;
        execution::run_dynamic(
            Arc::clone(&self.chain),
            Some(self.frame),
            kind,
            ContextOptions::default(),
            callback,
        )
        .await
    }

    /// A resolved result for a dynamic callback, built by the engine's adapter.
    pub fn resolve(&self, value: serde_json::Value) -> Returned {
        Returned::Pending(self.chain.engine.adapter.resolve(value))
    }

    /// A rejected result for a dynamic callback, built by the engine's adapter.
    pub fn reject(&self, error: Error) -> Returned {
        Returned::Pending(self.chain.engine.adapter.reject(error))
    }

    /// Settle every operation, then return all values or every outcome.
    pub async fn batch<T, Fut>(
        &self,
        operations: impl IntoIterator<Item = Fut>,
    ) -> Result<Vec<T>, BatchError<T>>
    where
        Fut: Future<Output = Result<T>>,
    {
        combinators::batch(operations).await
    }

    pub async fn sequence<T, Fut, S>(
        &self,
        source: S,
        options: SequenceOptions,
    ) -> Result<Vec<T>, SequenceError<T>>
    where
        S: FnMut(usize, Option<&T>) -> Option<Fut>,
        Fut: Future<Output = Result<T>>,
    {
        combinators::sequence(source, options).await
    }

    pub async fn page<T, Fut, S>(
        &self,
        source: S,
        options: PageOptions,
    ) -> Result<PageSummary, PageError<T>>
    where
        S: FnMut(usize, Option<&[T]>) -> Option<Vec<Fut>>,
        Fut: Future<Output = Result<T>>,
    {
        combinators::page(source, options).await
    }

    async fn nested<T, F, Fut>(
        &self,
        kind: ContextKind,
        options: ContextOptions,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        execution::run(
            Arc::clone(&self.chain),
            Some(self.frame),
            kind,
            options,
            callback,
        )
        .await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let info = self.info();
        f.debug_struct("Context")
            .field("kind", &info.kind)
            .field("level", &info.level)
            .field("connection", &info.connection)
            .finish()
    }
}
