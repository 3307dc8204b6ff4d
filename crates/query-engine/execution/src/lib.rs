//! Task and transaction execution on top of a database driver.
//!
//! A [`Database`] leases one connection per chain of contexts. A task runs a
//! callback against the leased connection; a transaction additionally wraps it
//! in BEGIN/COMMIT/ROLLBACK. Contexts nest freely: nested contexts share the
//! lease of their root, and only the outermost transaction on a connection
//! issues transaction-control statements.

pub mod adapter;
pub mod combinators;
pub mod context;
pub mod database;
pub mod driver;
pub mod error;
mod execution;
pub mod lease;
pub mod mask;
pub mod metrics;
mod query;
pub mod stack;

pub use adapter::{DynamicCallback, DynamicFuture, PromiseAdapter, Returned};
pub use combinators::{
    batch, page, sequence, BatchError, FailurePolicy, PageError, PageOptions, PageSummary,
    SequenceError, SequenceOptions, Settled,
};
pub use context::{Context, ContextInfo, ContextOptions};
pub use database::{Database, DatabaseOptions};
pub use driver::{Connection, Driver, Row};
pub use error::{ConnectionError, Error, QueryError, Result, RowCountError, UsageError};
pub use lease::{Lease, LeaseKey};
pub use mask::{IntoResultMask, QueryResult, ResultMask};
pub use stack::ContextKind;

pub use query_engine_sql::sql::string::SQL;
pub use query_engine_sql::sql::transaction::{IsolationLevel, TransactionMode};
