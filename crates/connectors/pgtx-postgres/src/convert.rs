//! Moving values between JSON and the PostgreSQL wire types.

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo};

use query_engine_execution::{QueryError, Row};
use query_engine_sql::sql::string::SQL;

/// The PostgreSQL type a JSON parameter is sent as.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl From<&Value> for Bind {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Bind::Null,
            Value::Bool(b) => Bind::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Bind::Int(i),
                None => n.as_f64().map_or_else(|| Bind::Text(n.to_string()), Bind::Float),
            },
            Value::String(s) => Bind::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Bind::Json(value.clone()),
        }
    }
}

/// Create a SQLx query from our SQL and bind its parameters in order.
pub fn build_query_with_params(statement: &SQL) -> Query<'_, Postgres, PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query(statement.sql.as_str()), |sqlx_query, param| {
            match Bind::from(param) {
                Bind::Null => sqlx_query.bind(None::<String>),
                Bind::Bool(b) => sqlx_query.bind(b),
                Bind::Int(i) => sqlx_query.bind(i),
                Bind::Float(f) => sqlx_query.bind(f),
                Bind::Text(s) => sqlx_query.bind(s),
                Bind::Json(v) => sqlx_query.bind(v),
            }
        })
}

/// Decode a row into a JSON object keyed by column name.
pub fn row_to_json(row: &PgRow) -> Result<Row, QueryError> {
    row.columns()
        .iter()
        .map(|column| {
            let value = column_to_json(row, column.ordinal(), column.type_info().name())
                .map_err(|err| {
                    QueryError::new(format!(
                        "unable to decode column \"{}\": {err}",
                        column.name()
                    ))
                })?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn column_to_json(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::from)
        }
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
        "UUID" => row
            .try_get::<Option<sqlx::types::Uuid>, _>(index)?
            .map(|uuid| Value::from(uuid.to_string())),
        other => {
            tracing::warn!(column_type = other, "unsupported column type, returning null");
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
