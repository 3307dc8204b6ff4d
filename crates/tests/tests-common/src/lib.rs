//! Helpers shared by the engine's integration tests.

pub mod driver;

use query_engine_execution::Row;

/// Install the test logger. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a row from a JSON object literal.
pub fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("a row must be a JSON object, got {other}"),
    }
}
