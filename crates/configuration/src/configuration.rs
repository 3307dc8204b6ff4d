//! Configuration for the engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use query_engine_sql::sql::transaction::TransactionMode;

use crate::values::PoolSettings;

/// The 'Configuration' type collects all the information necessary to run tasks and
/// transactions at runtime.
///
/// Values of this type are produced from a 'ParsedConfiguration' using
/// 'make_runtime_configuration', once every secret has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub connection_uri: String,
    pub pool_settings: PoolSettings,
    pub engine: EngineSettings,
}

/// Behaviour of the execution engine itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Send BEGIN/COMMIT/ROLLBACK in upper case.
    #[serde(default)]
    pub capitalize_sql: bool,
    /// Mode for transactions opened without an explicit one.
    #[serde(default, skip_serializing_if = "TransactionMode::is_default")]
    pub default_transaction_mode: TransactionMode,
}

impl EngineSettings {
    pub fn is_default(&self) -> bool {
        *self == EngineSettings::default()
    }
}
