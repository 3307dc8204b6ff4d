//! The boundary between the engine and the database driver it runs against.
//!
//! The engine never opens sockets or parses wire data itself. It asks a
//! [`Driver`] for a [`Connection`], sends statements through it, and hands it
//! back exactly once.

use async_trait::async_trait;

use query_engine_sql::sql::string::SQL;

use crate::error::{ConnectionError, QueryError};

/// A row as returned by the driver: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Hands out physical connections, usually from a pool.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// One physical connection.
///
/// `execute` may be called concurrently by sibling operations of the same
/// context; implementations serialize the wire traffic themselves.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, statement: &SQL) -> Result<Vec<Row>, QueryError>;

    /// Give the connection back to the driver. Called once per acquire.
    fn release(&self);
}
