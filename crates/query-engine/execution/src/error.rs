//! Errors raised while running tasks, transactions and queries.

use std::sync::Arc;

use thiserror::Error;

use crate::stack::ContextKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure a context, a query or a combinator can settle with.
///
/// Errors are cheap to clone so the owner of a transaction can remember the
/// first failure of a nested transaction while that failure also travels up
/// the caller's own stack.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    RowCount(#[from] RowCountError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// A batch, sequence or page converted into a plain error. The typed
    /// combinator errors keep every settled value; this keeps the counts and
    /// the first failure.
    #[error("{failed} of {total} operations failed: {first}")]
    Aggregate {
        total: usize,
        failed: usize,
        first: Box<Error>,
    },
    /// Raised by the caller's own callback.
    #[error("{0}")]
    Callback(Arc<anyhow::Error>),
}

impl Error {
    /// Wrap an error raised by a callback.
    pub fn callback(error: impl Into<anyhow::Error>) -> Error {
        Error::Callback(Arc::new(error.into()))
    }

    /// A callback error with a plain message.
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Error {
        Error::Callback(Arc::new(anyhow::Error::msg(message)))
    }
}

/// Malformed input from the caller. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Invalid Query Result Mask specified.")]
    InvalidMask,
    #[error("Cannot invoke {0}() without a callback function.")]
    MissingCallback(ContextKind),
    #[error("Callback function passed into {0}() didn't return a valid promise object.")]
    NotThenable(ContextKind),
    #[error("Callback function passed into {0}() returned nothing.")]
    NothingReturned(ContextKind),
    #[error("Invalid promise library specified.")]
    InvalidPromiseLibrary,
    #[error("Cannot start a transaction while another transaction is open on the same connection.")]
    TransactionInProgress,
    #[error("The context has already settled.")]
    ContextClosed,
    #[error("A nested {0}() stopped before it settled.")]
    Abandoned(ContextKind),
}

/// The driver rejected a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
    /// SQLSTATE, when the driver reports one.
    pub code: Option<String>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> QueryError {
        QueryError {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> QueryError {
        self.code = Some(code.into());
        self
    }
}

/// The driver could not hand out a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to acquire a connection: {message}")]
pub struct ConnectionError {
    pub message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> ConnectionError {
        ConnectionError {
            message: message.into(),
        }
    }
}

/// The rows returned did not match the query's result mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowCountError {
    #[error("No return data was expected from the query.")]
    NoDataExpected,
    #[error("No rows returned from the query.")]
    NoRows,
    #[error("Single row was expected from the query.")]
    MultipleRows,
}
