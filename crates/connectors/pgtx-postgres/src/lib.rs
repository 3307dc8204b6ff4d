//! Runs the execution engine against PostgreSQL through a sqlx connection pool.

pub mod convert;
pub mod driver;
pub mod health;
pub mod metrics;
pub mod state;

pub use driver::PgDriver;
pub use state::{create_state, InitializationError, State};
