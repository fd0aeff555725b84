//! Postgres SQL executor.

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Row as _, TypeInfo};
use tracing::{debug, warn};

use crate::executor::{ExecutionFailure, Row, SqlExecutor};

/// Executes SQL against Postgres.
///
/// Every execution opens its own connection and closes it before
/// returning, whether the query succeeded or not.
pub struct PostgresExecutor {
    url: String,
}

impl PostgresExecutor {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SqlExecutor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionFailure> {
        let mut conn = PgConnection::connect(&self.url)
            .await
            .map_err(classify)?;

        let result = sqlx::query(sql).fetch_all(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection: {e}");
        }

        let rows = result.map_err(classify)?;
        debug!("Query returned {} rows", rows.len());
        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Map a driver error to a failure class.
///
/// SQLSTATE class 08 and transport errors are connectivity; any other
/// server-side error is a validity problem with the query.
pub fn classify(err: sqlx::Error) -> ExecutionFailure {
    match &err {
        sqlx::Error::Database(db) => {
            let connection_class = db.code().is_some_and(|code| code.starts_with("08"));
            if connection_class {
                ExecutionFailure::connectivity(db.message())
            } else {
                ExecutionFailure::validity(db.message())
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => ExecutionFailure::connectivity(err.to_string()),
        _ => ExecutionFailure::unexpected(err.to_string()),
    }
}

fn row_to_json(row: &PgRow) -> Row {
    let mut map = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), cell_to_json(row, i, column.type_info().name()));
    }
    map
}

fn cell_to_json(row: &PgRow, i: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, i: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(i).ok().flatten()
    }

    let value = match type_name {
        "BOOL" => get::<bool>(row, i).map(Value::Bool),
        "INT2" => get::<i16>(row, i).map(Value::from),
        "INT4" => get::<i32>(row, i).map(Value::from),
        "INT8" => get::<i64>(row, i).map(Value::from),
        "FLOAT4" => get::<f32>(row, i).and_then(|v| Number::from_f64(f64::from(v)).map(Value::Number)),
        "FLOAT8" => get::<f64>(row, i).and_then(|v| Number::from_f64(v).map(Value::Number)),
        "NUMERIC" => get::<rust_decimal::Decimal>(row, i).map(decimal_to_json),
        "JSON" | "JSONB" => get::<Value>(row, i),
        "UUID" => get::<uuid::Uuid>(row, i).map(|v| Value::String(v.to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, i).map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, i).map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => {
            get::<chrono::DateTime<chrono::Utc>>(row, i).map(|v| Value::String(v.to_rfc3339()))
        }
        _ => get::<String>(row, i).map(Value::String),
    };

    value.unwrap_or(Value::Null)
}

fn decimal_to_json(value: rust_decimal::Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;

    if value.fract().is_zero() {
        if let Some(int) = value.to_i64() {
            return Value::from(int);
        }
    }
    value
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}
