//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::db::{
    bind_values, connect_with_retry, BackendResponse, BoundStatement, DatabaseBackend,
    DatabaseClient, Row, Value,
};
use crate::error::{StencilError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Either, Executor, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::debug;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresClient {
    /// Connects to the database described by `config`.
    pub async fn connect(config: &ConnectionConfig, execution: &ExecutionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let pool = connect_with_retry(|| {
            PgPoolOptions::new()
                .max_connections(execution.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
        })
        .await
        .map_err(|e| map_connection_error(e, config))?;

        Ok(Self {
            pool,
            timeout: execution.timeout(),
        })
    }

    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute(&self, statement: &BoundStatement) -> Result<BackendResponse> {
        debug!(
            params = statement.params.len(),
            "Dispatching statement to postgres"
        );

        let query = bind_values(sqlx::query(&statement.sql), &statement.params);

        let collect = async {
            let mut stream = (&self.pool).fetch_many(query);
            let mut rows = Vec::new();
            let mut rows_affected: Option<u64> = None;

            while let Some(step) = stream.try_next().await? {
                match step {
                    Either::Left(done) => {
                        rows_affected = Some(rows_affected.unwrap_or(0) + done.rows_affected());
                    }
                    Either::Right(row) => rows.push(convert_row(&row)),
                }
            }

            Ok::<_, sqlx::Error>((rows, rows_affected))
        };

        let (rows, rows_affected) = tokio::time::timeout(self.timeout, collect)
            .await
            .map_err(|_| {
                StencilError::backend(format!(
                    "Query timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| StencilError::backend(format_query_error(e)))?;

        Ok(BackendResponse::Rows {
            rows,
            rows_affected,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    let mut converted = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        converted.push(col.name(), convert_value(row, i, col.type_info().name()));
    }
    converted
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // For all other types, try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> StencilError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.effective_port().unwrap_or(5432);
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        StencilError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        StencilError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        StencilError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        StencilError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        StencilError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        StencilError::connection(error.to_string())
    }
}

/// Formats a query error with Postgres detail and hint fields if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    }

    result
}
