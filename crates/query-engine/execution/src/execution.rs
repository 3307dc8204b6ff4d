//! Run a unit of work as a task or a transaction on a context chain.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug_span, info_span, Instrument, Span};

use query_engine_sql::sql::transaction::{Statement, TransactionMode};

use crate::adapter::{DynamicCallback, DynamicFuture, PromiseAdapter, Returned};
use crate::context::{Context, ContextOptions};
use crate::driver::Driver;
use crate::error::{Error, Result, UsageError};
use crate::lease::Lease;
use crate::metrics::Metrics;
use crate::query;
use crate::stack::{ContextKind, ContextStack, FrameId, Role};

/// Settings shared by every chain started from one database root.
pub(crate) struct Engine {
    pub driver: Arc<dyn Driver>,
    pub metrics: Option<Metrics>,
    pub capitalize_sql: bool,
    pub default_mode: TransactionMode,
    pub adapter: PromiseAdapter,
}

/// One leased connection and the contexts using it.
pub(crate) struct Chain {
    pub lease: Lease,
    pub stack: ContextStack,
    pub engine: Arc<Engine>,
    /// An owning transaction stopped being polled between BEGIN and its
    /// COMMIT or ROLLBACK. The next statement on the connection rolls it back
    /// first.
    abandoned: AtomicBool,
}

impl Chain {
    pub async fn acquire(engine: &Arc<Engine>) -> Result<Arc<Chain>> {
        let lease = Lease::acquire(engine.driver.as_ref(), engine.metrics.as_ref()).await?;
        Ok(Arc::new(Chain {
            lease,
            stack: ContextStack::default(),
            engine: Arc::clone(engine),
            abandoned: AtomicBool::new(false),
        }))
    }

    pub fn has_abandoned_transaction(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

/// Closes the frame and drops its lease reference however the context ends,
/// including when the caller stops polling it.
struct Scope {
    chain: Arc<Chain>,
    frame: FrameId,
}

impl Drop for Scope {
    fn drop(&mut self) {
        let duration = self.chain.stack.close(self.frame);
        self.chain.lease.release();
        tracing::trace!(
            connection = %self.chain.lease.key(),
            open_contexts = self.chain.stack.open_count(),
            duration = ?duration,
            "context settled"
        );
    }
}

/// Armed while a transaction is between its first statement and its outcome.
/// Dropping it armed means the caller stopped polling: an owner leaves the
/// physical transaction to be rolled back, a delegate dooms its owner.
struct Unsettled<'a> {
    chain: &'a Chain,
    role: Role,
    armed: bool,
}

impl<'a> Unsettled<'a> {
    fn new(chain: &'a Chain, role: Role) -> Unsettled<'a> {
        Unsettled {
            chain,
            role,
            armed: true,
        }
    }

    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for Unsettled<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.role {
            Role::Owner => {
                tracing::debug!(
                    connection = %self.chain.lease.key(),
                    "transaction abandoned before it settled"
                );
                self.chain.abandoned.store(true, Ordering::Release);
            }
            Role::Delegate { owner } => {
                let error = Error::from(UsageError::Abandoned(ContextKind::Transaction));
                self.chain.stack.mark_rollback(owner, &error);
            }
            Role::Task => {}
        }
    }
}

/// Open a context under `parent` and run `callback` in it.
///
/// The outermost transaction on the chain brackets the callback with
/// BEGIN and COMMIT or ROLLBACK. Nested transactions issue nothing: a failure
/// dooms the owner's transaction and travels up unchanged.
pub(crate) async fn run<T, F, Fut>(
    chain: Arc<Chain>,
    parent: Option<FrameId>,
    kind: ContextKind,
    options: ContextOptions,
    callback: F,
) -> Result<T>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let opened = chain.stack.open(kind, parent, options.tag.clone())?;
    if let Err(err) = chain.lease.retain() {
        chain.stack.close(opened.id);
        return Err(err.into());
    }
    let _scope = Scope {
        chain: Arc::clone(&chain),
        frame: opened.id,
    };

    if let Some(metrics) = &chain.engine.metrics {
        match kind {
            ContextKind::Task => metrics.tasks_total.inc(),
            ContextKind::Transaction => metrics.transactions_total.inc(),
        }
    }

    let span = context_span(kind, opened.info.level, &chain, options.tag.as_deref());
    let (frame, role) = (opened.id, opened.role);
    let context = Context::new(Arc::clone(&chain), frame, opened.info);

    async move {
        match role {
            Role::Task => callback(context).await,
            Role::Delegate { owner } => {
                if options.mode.is_some() {
                    tracing::debug!("transaction mode ignored inside an open transaction");
                }
                let unsettled = Unsettled::new(&chain, role);
                let outcome = callback(context).await;
                unsettled.settle();
                if let Err(err) = &outcome {
                    chain.stack.mark_rollback(owner, err);
                }
                outcome
            }
            Role::Owner => {
                let mode = options.mode.unwrap_or(chain.engine.default_mode);
                let unsettled = Unsettled::new(&chain, role);
                if let Err(err) = control(&chain, Statement::Begin(mode)).await {
                    unsettled.settle();
                    return Err(err);
                }

                let outcome = match (callback(context).await, chain.stack.take_failure(frame)) {
                    (Ok(_), Some(nested)) => {
                        tracing::debug!(error = %nested, "nested transaction failed");
                        Err(nested)
                    }
                    (outcome, _) => outcome,
                };

                let settled = match outcome {
                    Ok(value) => control(&chain, Statement::Commit).await.map(|()| {
                        if let Some(metrics) = &chain.engine.metrics {
                            metrics.commits_total.inc();
                        }
                        value
                    }),
                    Err(err) => {
                        rollback(&chain).await;
                        Err(err)
                    }
                };
                unsettled.settle();
                settled
            }
        }
    }
    .instrument(span)
    .await
}

/// Run a callback built at runtime, rejecting the shapes that are not an
/// asynchronous result.
pub(crate) async fn run_dynamic(
    chain: Arc<Chain>,
    parent: Option<FrameId>,
    kind: ContextKind,
    options: ContextOptions,
    callback: DynamicCallback,
) -> Result<serde_json::Value> {
    let adapter = chain.engine.adapter.clone();
    run(chain, parent, kind, options, move |context: Context| {
        settle_returned(&adapter, kind, callback(context))
    })
    .await
}

fn settle_returned(adapter: &PromiseAdapter, kind: ContextKind, returned: Returned) -> DynamicFuture {
    match returned {
        Returned::Pending(pending) => adapter.construct(pending),
        Returned::Value(_) => adapter.reject(UsageError::NotThenable(kind).into()),
        Returned::Nothing => adapter.reject(UsageError::NothingReturned(kind).into()),
    }
}

async fn control(chain: &Chain, statement: Statement) -> Result<()> {
    let sql = statement.to_sql(chain.engine.capitalize_sql);
    tracing::debug!(statement = %sql, "transaction control");
    query::send(chain, &sql).await?;
    Ok(())
}

/// Issue ROLLBACK. A failure here is logged and counted; the error that caused
/// the rollback is what the caller sees.
async fn rollback(chain: &Chain) {
    let result = control(chain, Statement::Rollback).await;
    record_rollback(chain, result);
}

/// Roll back the transaction an owner abandoned, ahead of the next statement
/// on the connection.
pub(crate) async fn rollback_abandoned(chain: &Chain) {
    let sql = Statement::Rollback.to_sql(chain.engine.capitalize_sql);
    tracing::debug!(statement = %sql, "rolling back an abandoned transaction");
    let result = query::dispatch(chain, &sql).await;
    chain.abandoned.store(false, Ordering::Release);
    record_rollback(chain, result.map(|_| ()).map_err(Error::from));
}

fn record_rollback(chain: &Chain, result: Result<()>) {
    match result {
        Ok(()) => {
            if let Some(metrics) = &chain.engine.metrics {
                metrics.rollbacks_total.inc();
            }
        }
        Err(err) => {
            tracing::error!(
                meta.signal_type = "log",
                event.domain = "pgtx",
                event.name = "Rollback error",
                name = "Rollback error",
                body = %err,
                connection = %chain.lease.key(),
                error = true,
            );
            if let Some(metrics) = &chain.engine.metrics {
                metrics.rollback_failures_total.inc();
            }
        }
    }
}

fn context_span(kind: ContextKind, level: usize, chain: &Chain, tag: Option<&str>) -> Span {
    let connection = chain.lease.key();
    match (kind, level) {
        (ContextKind::Task, 0) => info_span!("task", %connection, tag),
        (ContextKind::Transaction, 0) => info_span!("transaction", %connection, tag),
        (ContextKind::Task, _) => debug_span!("task", %connection, tag, level),
        (ContextKind::Transaction, _) => debug_span!("transaction", %connection, tag, level),
    }
}

