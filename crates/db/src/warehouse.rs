use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{debug, warn};

use fred_core::{QueryResult, QueryRow, RetryPolicy};

use crate::WarehousePool;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query exceeded its {0:?} timeout")]
    Timeout(Duration),
    #[error("query execution failed: {0}")]
    Execution(#[from] sqlx::Error),
    #[error("could not decode column `{column}` of type {type_name}")]
    Decode { column: String, type_name: String },
}

impl QueryError {
    /// Timeouts on a read-only statement are safe to retry; anything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Execution(sqlx::Error::PoolTimedOut))
    }
}

/// Runs validated, read-only statements against the data warehouse.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run_select(&self, sql: &str, timeout: Duration) -> Result<QueryResult, QueryError>;
}

pub struct MySqlQueryExecutor {
    pool: WarehousePool,
    retry: RetryPolicy,
}

impl MySqlQueryExecutor {
    pub fn new(pool: WarehousePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn fetch_read_only(&self, sql: &str) -> Result<QueryResult, QueryError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *conn).await?;
        let mut tx = sqlx::Connection::begin(&mut *conn).await?;

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        tx.rollback().await?;

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult::new(rows))
    }
}

#[async_trait]
impl QueryExecutor for MySqlQueryExecutor {
    async fn run_select(&self, sql: &str, timeout: Duration) -> Result<QueryResult, QueryError> {
        debug!(event_name = "db.warehouse.query_started", sql, "running warehouse query");

        self.retry
            .run(QueryError::is_retryable, |attempt| async move {
                if attempt > 0 {
                    warn!(event_name = "db.warehouse.query_retry", attempt, "retrying timed out query");
                }
                match tokio::time::timeout(timeout, self.fetch_read_only(sql)).await {
                    Ok(result) => result,
                    Err(_) => Err(QueryError::Timeout(timeout)),
                }
            })
            .await
    }
}

fn decode_row(row: &MySqlRow) -> Result<QueryRow, QueryError> {
    let columns = row
        .columns()
        .iter()
        .map(|column| {
            let value = decode_value(row, column.ordinal(), column.type_info().name())?;
            Ok((column.name().to_owned(), value))
        })
        .collect::<Result<Vec<_>, QueryError>>()?;
    Ok(QueryRow::new(columns))
}

fn decode_value(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, QueryError> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let decoded = match type_name {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(Value::from)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<u64, _>(index).map(Value::from),
        "FLOAT" => row.try_get::<f32, _>(index).map(|value| Value::from(f64::from(value))),
        "DOUBLE" => row.try_get::<f64, _>(index).map(Value::from),
        "DECIMAL" => row.try_get::<Decimal, _>(index).map(|value| Value::from(value.to_string())),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(|value| Value::from(value.to_string())),
        "DATETIME" => {
            row.try_get::<NaiveDateTime, _>(index).map(|value| Value::from(value.to_string()))
        }
        "TIMESTAMP" => {
            row.try_get::<DateTime<Utc>, _>(index).map(|value| Value::from(value.to_rfc3339()))
        }
        "TIME" => row.try_get::<NaiveTime, _>(index).map(|value| Value::from(value.to_string())),
        "JSON" => row.try_get::<Value, _>(index),
        _ => row.try_get::<String, _>(index).map(Value::from),
    };

    decoded.or_else(|_| {
        // Binary or otherwise unmapped columns: keep the bytes as lossy text.
        row.try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            .map_err(|_| QueryError::Decode {
                column: row.columns()[index].name().to_owned(),
                type_name: type_name.to_owned(),
            })
    })
}
