//! MySQL database client implementation.
//!
//! MySQL hands results back one result set at a time, so the client keeps
//! each set separate and leaves flattening to the normalizer.

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::db::{
    bind_values, connect_with_retry, BackendResponse, BoundStatement, DatabaseBackend,
    DatabaseClient, Row, Value,
};
use crate::error::{StencilError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Either, Executor, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::debug;

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
    timeout: Duration,
}

impl MySqlClient {
    /// Connects to the database described by `config`.
    pub async fn connect(config: &ConnectionConfig, execution: &ExecutionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let pool = connect_with_retry(|| {
            MySqlPoolOptions::new()
                .max_connections(execution.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
        })
        .await
        .map_err(|e| {
            StencilError::connection(format!(
                "Cannot connect to {}: {e}",
                config.display_string()
            ))
        })?;

        Ok(Self {
            pool,
            timeout: execution.timeout(),
        })
    }

    /// Creates a new MySqlClient from an existing connection pool.
    pub fn from_pool(pool: MySqlPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::MySql
    }

    async fn execute(&self, statement: &BoundStatement) -> Result<BackendResponse> {
        debug!(
            params = statement.params.len(),
            "Dispatching statement to mysql"
        );

        let query = bind_values(sqlx::query(&statement.sql), &statement.params);

        let collect = async {
            let mut stream = (&self.pool).fetch_many(query);
            let mut collector = ResultSetCollector::default();

            while let Some(step) = stream.try_next().await? {
                match step {
                    Either::Right(row) => collector.push_row(convert_row(&row)),
                    Either::Left(done) => collector.finish_statement(done.rows_affected()),
                }
            }

            Ok::<_, sqlx::Error>(collector)
        };

        let collector = tokio::time::timeout(self.timeout, collect)
            .await
            .map_err(|_| {
                StencilError::backend(format!(
                    "Query timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| StencilError::backend(format_query_error(e)))?;

        Ok(collector.into_response())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Groups streamed rows into one set per statement.
#[derive(Debug, Default)]
struct ResultSetCollector {
    sets: Vec<Vec<Row>>,
    current: Vec<Row>,
    rows_affected: u64,
}

impl ResultSetCollector {
    fn push_row(&mut self, row: Row) {
        self.current.push(row);
    }

    fn finish_statement(&mut self, rows_affected: u64) {
        self.rows_affected += rows_affected;
        if !self.current.is_empty() {
            self.sets.push(std::mem::take(&mut self.current));
        }
    }

    fn into_response(mut self) -> BackendResponse {
        if !self.current.is_empty() {
            self.sets.push(std::mem::take(&mut self.current));
        }
        if self.sets.is_empty() {
            // Pure DML: nothing but the affected-row count.
            return BackendResponse::Rows {
                rows: Vec::new(),
                rows_affected: Some(self.rows_affected),
            };
        }
        BackendResponse::ResultSets(self.sets)
    }
}

fn convert_row(row: &MySqlRow) -> Row {
    let mut converted = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        converted.push(col.name(), convert_value(row, i, col.type_info().name()));
    }
    converted
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let type_name = type_name.to_uppercase();

    if type_name.ends_with("UNSIGNED") {
        return row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(|v| i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64)))
            .unwrap_or(Value::Null);
    }

    match type_name.as_str() {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
