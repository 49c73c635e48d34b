//! SQLite database client implementation.

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::db::{
    bind_values, BackendResponse, BoundStatement, DatabaseBackend, DatabaseClient, Row, Value,
};
use crate::error::{StencilError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteClient {
    /// Opens the database file described by `config`.
    ///
    /// In-memory databases are limited to one connection so every statement
    /// sees the same data.
    pub async fn connect(config: &ConnectionConfig, execution: &ExecutionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| StencilError::config(format!("Invalid SQLite path: {e}")))?
            .busy_timeout(Duration::from_secs(5));

        let max_connections = if conn_str.contains(":memory:") {
            1
        } else {
            execution.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                StencilError::connection(format!("Cannot open {}: {e}", config.display_string()))
            })?;

        Ok(Self {
            pool,
            timeout: execution.timeout(),
        })
    }

    /// Creates a new SqliteClient from an existing connection pool.
    pub fn from_pool(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn execute(&self, statement: &BoundStatement) -> Result<BackendResponse> {
        debug!(
            params = statement.params.len(),
            "Dispatching statement to sqlite"
        );

        let query = bind_values(sqlx::query(&statement.sql), &statement.params);

        let rows = tokio::time::timeout(self.timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| {
                StencilError::backend(format!(
                    "Query timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| match e.as_database_error() {
                Some(db_error) => StencilError::backend(db_error.message()),
                None => StencilError::backend(e.to_string()),
            })?;

        Ok(BackendResponse::Plain(rows.iter().map(convert_row).collect()))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn convert_row(row: &SqliteRow) -> Row {
    let mut converted = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        converted.push(col.name(), convert_value(row, i, col.type_info().name()));
    }
    converted
}

/// SQLite values carry their own storage class, so decoding tries each class
/// in turn instead of trusting the declared column type.
fn convert_value(row: &SqliteRow, index: usize, declared: &str) -> Value {
    if declared.eq_ignore_ascii_case("BOOLEAN") {
        if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(Value::Bytes)
        .unwrap_or(Value::Null)
}
