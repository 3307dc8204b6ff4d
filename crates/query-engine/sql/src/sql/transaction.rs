//! Transaction-control statements: BEGIN with its mode clauses, COMMIT and ROLLBACK.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::string::SQL;

/// Transaction isolation levels understood by PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum IsolationLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::ReadCommitted => "read committed",
        }
    }
}

/// Settings applied when a transaction is opened.
///
/// Every field is optional; an unset field leaves the server default in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Only meaningful for serializable, read-only transactions; ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferrable: Option<bool>,
}

impl TransactionMode {
    pub fn new(
        isolation: Option<IsolationLevel>,
        read_only: Option<bool>,
        deferrable: Option<bool>,
    ) -> TransactionMode {
        TransactionMode {
            isolation,
            read_only,
            deferrable,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == TransactionMode::default()
    }

    /// The lower-case BEGIN statement for this mode.
    pub fn begin(&self) -> String {
        let mut clauses = vec!["begin".to_string()];

        if let Some(isolation) = self.isolation {
            clauses.push(format!("isolation level {}", isolation.as_sql()));
        }

        match self.read_only {
            Some(true) => clauses.push("read only".to_string()),
            Some(false) => clauses.push("read write".to_string()),
            None => {}
        }

        if self.isolation == Some(IsolationLevel::Serializable) && self.read_only == Some(true) {
            match self.deferrable {
                Some(true) => clauses.push("deferrable".to_string()),
                Some(false) => clauses.push("not deferrable".to_string()),
                None => {}
            }
        }

        clauses.join(" ")
    }
}

/// A statement the engine issues to control the physical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    Begin(TransactionMode),
    Commit,
    Rollback,
}

impl Statement {
    /// Render the statement, upper-cased when `capitalize` is set.
    pub fn to_sql(&self, capitalize: bool) -> SQL {
        let text = match self {
            Statement::Begin(mode) => mode.begin(),
            Statement::Commit => "commit".to_string(),
            Statement::Rollback => "rollback".to_string(),
        };
        if capitalize {
            SQL::new(text.to_uppercase())
        } else {
            SQL::new(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn default_mode_is_a_plain_begin() {
        assert_eq!(TransactionMode::default().begin(), "begin");
        assert!(TransactionMode::default().is_default());
    }

    #[test]
    fn renders_isolation_and_access() {
        let mode = TransactionMode::new(Some(IsolationLevel::RepeatableRead), Some(false), None);
        assert_eq!(mode.begin(), "begin isolation level repeatable read read write");
    }

    #[test]
    fn deferrable_requires_serializable_read_only() {
        let ignored = TransactionMode::new(Some(IsolationLevel::ReadCommitted), Some(true), Some(true));
        assert_eq!(ignored.begin(), "begin isolation level read committed read only");

        let applied = TransactionMode::new(Some(IsolationLevel::Serializable), Some(true), Some(false));
        assert_eq!(
            applied.begin(),
            "begin isolation level serializable read only not deferrable"
        );
    }

    #[test]
    fn capitalizes_on_request() {
        let mode = TransactionMode::new(Some(IsolationLevel::Serializable), None, None);
        assert_eq!(
            Statement::Begin(mode).to_sql(true).sql,
            "BEGIN ISOLATION LEVEL SERIALIZABLE"
        );
        assert_eq!(Statement::Commit.to_sql(false).sql, "commit");
        assert_eq!(Statement::Rollback.to_sql(true).sql, "ROLLBACK");
    }

    #[test]
    fn deserializes_camel_case() {
        let mode: TransactionMode = serde_json::from_str(
            r#"{ "isolation": "repeatableRead", "readOnly": true }"#,
        )
        .unwrap();
        assert_eq!(
            mode,
            TransactionMode::new(Some(IsolationLevel::RepeatableRead), Some(true), None)
        );
    }
}
