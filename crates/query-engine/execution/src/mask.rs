//! The Query Result Mask: how many rows a query call may legally return.

use std::fmt;
use std::str::FromStr;

use crate::driver::Row;
use crate::error::{RowCountError, UsageError};

/// A validated combination of the `one`, `many` and `none` flags.
///
/// Only coherent combinations can be constructed: a single flag, `one|none`,
/// `many|none` and `any`. `one|many` is contradictory and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultMask(u8);

impl ResultMask {
    /// Exactly one row.
    pub const ONE: ResultMask = ResultMask(1);
    /// One or more rows, returned as a sequence.
    pub const MANY: ResultMask = ResultMask(2);
    /// No rows.
    pub const NONE: ResultMask = ResultMask(4);
    pub const ONE_OR_NONE: ResultMask = ResultMask(1 | 4);
    pub const MANY_OR_NONE: ResultMask = ResultMask(2 | 4);
    /// Any number of rows, returned as a sequence.
    pub const ANY: ResultMask = ResultMask(1 | 2 | 4);

    const LEGAL: [ResultMask; 6] = [
        ResultMask::ONE,
        ResultMask::MANY,
        ResultMask::NONE,
        ResultMask::ONE_OR_NONE,
        ResultMask::MANY_OR_NONE,
        ResultMask::ANY,
    ];

    /// The mask with these flag bits, if the combination is coherent.
    /// Combine flags on their bits: `ResultMask::ONE.bits() | ResultMask::NONE.bits()`.
    pub fn from_bits(bits: u8) -> Result<ResultMask, UsageError> {
        ResultMask::LEGAL
            .into_iter()
            .find(|mask| mask.0 == bits)
            .ok_or(UsageError::InvalidMask)
    }

    /// Validate a raw mask value.
    pub fn validate(raw: i64) -> Result<ResultMask, UsageError> {
        u8::try_from(raw)
            .map_err(|_| UsageError::InvalidMask)
            .and_then(ResultMask::from_bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: ResultMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Shape the rows returned by the driver according to the mask.
    pub fn interpret(self, mut rows: Vec<Row>) -> Result<QueryResult, RowCountError> {
        if self.contains(ResultMask::MANY) {
            return Ok(QueryResult::Rows(rows));
        }
        match (rows.len(), self.contains(ResultMask::ONE), self.contains(ResultMask::NONE)) {
            (0, true, true) => Ok(QueryResult::OptionalRow(None)),
            (0, true, false) => Err(RowCountError::NoRows),
            (0, false, _) => Ok(QueryResult::Nothing),
            (1, true, true) => Ok(QueryResult::OptionalRow(rows.pop())),
            (1, true, false) => rows.pop().map(QueryResult::Row).ok_or(RowCountError::NoRows),
            (_, true, _) => Err(RowCountError::MultipleRows),
            (_, false, _) => Err(RowCountError::NoDataExpected),
        }
    }
}

impl fmt::Display for ResultMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            ResultMask::ONE => "one",
            ResultMask::MANY => "many",
            ResultMask::NONE => "none",
            ResultMask::ONE_OR_NONE => "one|none",
            ResultMask::MANY_OR_NONE => "many|none",
            _ => "any",
        };
        write!(f, "{name}")
    }
}

/// Parses `"one"`, `"many|none"`, `"any"`, ... or a decimal integer.
impl FromStr for ResultMask {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<ResultMask, UsageError> {
        let s = s.trim();
        if let Ok(raw) = s.parse::<i64>() {
            return ResultMask::validate(raw);
        }
        let mut raw = 0;
        for flag in s.split('|') {
            raw |= match flag.trim() {
                "one" => 1,
                "many" => 2,
                "none" => 4,
                "any" => 7,
                _ => return Err(UsageError::InvalidMask),
            };
        }
        ResultMask::validate(raw)
    }
}

/// Anything a caller may pass as a mask. Validation happens before any
/// statement reaches the driver.
pub trait IntoResultMask {
    fn into_mask(self) -> Result<ResultMask, UsageError>;
}

impl IntoResultMask for ResultMask {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        Ok(self)
    }
}

impl IntoResultMask for u8 {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        ResultMask::from_bits(self)
    }
}

impl IntoResultMask for i32 {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        ResultMask::validate(i64::from(self))
    }
}

impl IntoResultMask for i64 {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        ResultMask::validate(self)
    }
}

impl IntoResultMask for &str {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        self.parse()
    }
}

/// Masks arriving as JSON must be integers; strings, floats and other values
/// are rejected.
impl IntoResultMask for &serde_json::Value {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        self.as_i64()
            .ok_or(UsageError::InvalidMask)
            .and_then(ResultMask::validate)
    }
}

impl IntoResultMask for serde_json::Value {
    fn into_mask(self) -> Result<ResultMask, UsageError> {
        (&self).into_mask()
    }
}

/// The rows of a query, shaped by its mask.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// `none`: the query returned nothing.
    Nothing,
    /// `one`: exactly one row.
    Row(Row),
    /// `one|none`: a row, or nothing.
    OptionalRow(Option<Row>),
    /// `many`, `many|none` and `any`: every row returned.
    Rows(Vec<Row>),
}

impl QueryResult {
    /// The single row, if the result holds one.
    pub fn into_row(self) -> Option<Row> {
        match self {
            QueryResult::Row(row) => Some(row),
            QueryResult::OptionalRow(row) => row,
            QueryResult::Nothing => None,
            QueryResult::Rows(mut rows) => {
                if rows.len() == 1 {
                    rows.pop()
                } else {
                    None
                }
            }
        }
    }

    /// All rows as a sequence.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryResult::Nothing | QueryResult::OptionalRow(None) => vec![],
            QueryResult::Row(row) | QueryResult::OptionalRow(Some(row)) => vec![row],
            QueryResult::Rows(rows) => rows,
        }
    }
}
