//! SQL text handed to the database driver, and the transaction-control
//! statements the execution engine issues on its own behalf.

pub mod sql;
