//! Low-level SQL values.

pub mod string;
pub mod transaction;
