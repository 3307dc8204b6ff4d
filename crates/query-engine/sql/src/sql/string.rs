//! Type definitions of a low-level SQL string representation.

use std::fmt;

/// A SQL statement as text, with the parameters the driver binds to its
/// `$n` placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SQL {
    pub sql: String,
    pub params: Vec<Param>,
}

/// A parameter bound to a placeholder, kept as JSON so any driver can decide
/// how to encode it.
pub type Param = serde_json::Value;

impl SQL {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> SQL {
        SQL {
            sql: sql.into(),
            params: vec![],
        }
    }

    /// Append a parameter. The first call binds `$1`, the second `$2`, and so on.
    #[must_use]
    pub fn bind(mut self, param: impl Into<Param>) -> SQL {
        self.params.push(param.into());
        self
    }

    /// Replace all parameters at once.
    #[must_use]
    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> SQL {
        self.params = params.into_iter().collect();
        self
    }
}

impl From<&str> for SQL {
    fn from(sql: &str) -> SQL {
        SQL::new(sql)
    }
}

impl From<String> for SQL {
    fn from(sql: String) -> SQL {
        SQL::new(sql)
    }
}

impl fmt::Display for SQL {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}
