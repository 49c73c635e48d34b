//! Execution log persistence.
//!
//! Append-only: entries are written once per execution attempt and never
//! modified afterwards.

use crate::db::Parameters;
use crate::error::{StencilError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use uuid::Uuid;

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;

/// Outcome of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            _ => Self::Error,
        }
    }
}

/// A recorded execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: String,
    pub query_id: Option<String>,
    pub executed_by: String,
    /// Parameters exactly as the caller supplied them.
    pub parameters_used: serde_json::Value,
    pub execution_time_ms: i64,
    pub rows_affected: Option<i64>,
    pub error_message: Option<String>,
    pub status: ExecutionStatus,
    pub executed_at: String,
}

#[derive(Debug, Clone, FromRow)]
struct ExecutionLogRow {
    id: String,
    query_id: Option<String>,
    executed_by: String,
    parameters_used: String,
    execution_time_ms: i64,
    rows_affected: Option<i64>,
    error_message: Option<String>,
    status: String,
    executed_at: String,
}

impl From<ExecutionLogRow> for ExecutionLog {
    fn from(row: ExecutionLogRow) -> Self {
        Self {
            id: row.id,
            query_id: row.query_id,
            executed_by: row.executed_by,
            parameters_used: serde_json::from_str(&row.parameters_used)
                .unwrap_or(serde_json::Value::String(row.parameters_used)),
            execution_time_ms: row.execution_time_ms,
            rows_affected: row.rows_affected,
            error_message: row.error_message,
            status: ExecutionStatus::from_str(&row.status),
            executed_at: row.executed_at,
        }
    }
}

/// A log entry before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecutionLog {
    pub query_id: Option<String>,
    pub executed_by: String,
    pub parameters_used: serde_json::Value,
    pub execution_time_ms: u64,
    pub rows_affected: Option<u64>,
    pub error_message: Option<String>,
    pub status: ExecutionStatus,
}

impl NewExecutionLog {
    /// Entry for an execution that produced a result.
    pub fn success(
        query_id: impl Into<String>,
        executed_by: impl Into<String>,
        parameters: &Parameters,
        execution_time_ms: u64,
        rows_affected: u64,
    ) -> Self {
        Self {
            query_id: Some(query_id.into()),
            executed_by: executed_by.into(),
            parameters_used: parameters_json(parameters),
            execution_time_ms,
            rows_affected: Some(rows_affected),
            error_message: None,
            status: ExecutionStatus::Success,
        }
    }

    /// Entry for an execution that failed after the template was resolved.
    pub fn failure(
        query_id: impl Into<String>,
        executed_by: impl Into<String>,
        parameters: &Parameters,
        execution_time_ms: u64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            query_id: Some(query_id.into()),
            executed_by: executed_by.into(),
            parameters_used: parameters_json(parameters),
            execution_time_ms,
            rows_affected: None,
            error_message: Some(error_message.into()),
            status: ExecutionStatus::Error,
        }
    }
}

fn parameters_json(parameters: &Parameters) -> serde_json::Value {
    serde_json::to_value(parameters).unwrap_or_default()
}

const LOG_COLUMNS: &str = "id, query_id, executed_by, parameters_used, execution_time_ms, \
                           rows_affected, error_message, status, executed_at";

/// Appends a log entry and returns it as stored.
pub async fn append_log(pool: &SqlitePool, entry: &NewExecutionLog) -> Result<ExecutionLog> {
    let id = Uuid::new_v4().to_string();
    let parameters = serde_json::to_string(&entry.parameters_used)
        .map_err(|e| StencilError::persistence(format!("Failed to encode parameters: {e}")))?;

    let row: ExecutionLogRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO execution_logs
        (id, query_id, executed_by, parameters_used, execution_time_ms, rows_affected,
         error_message, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {LOG_COLUMNS}
        "#
    ))
    .bind(&id)
    .bind(&entry.query_id)
    .bind(&entry.executed_by)
    .bind(&parameters)
    .bind(saturating_i64(entry.execution_time_ms))
    .bind(entry.rows_affected.map(saturating_i64))
    .bind(&entry.error_message)
    .bind(entry.status.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| StencilError::persistence(format!("Failed to append execution log: {e}")))?;

    Ok(row.into())
}

/// Lists a template's log entries, newest first.
///
/// `limit` defaults to 50 and is capped at 500; `offset` defaults to 0.
pub async fn list_logs_by_template(
    pool: &SqlitePool,
    query_id: &str,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<ExecutionLog>> {
    let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(0, MAX_LOG_LIMIT);
    let offset = offset.unwrap_or(0).max(0);

    let rows: Vec<ExecutionLogRow> = sqlx::query_as(&format!(
        "SELECT {LOG_COLUMNS} FROM execution_logs WHERE query_id = ? \
         ORDER BY executed_at DESC, rowid DESC LIMIT ? OFFSET ?"
    ))
    .bind(query_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| StencilError::persistence(format!("Failed to list execution logs: {e}")))?;

    Ok(rows.into_iter().map(ExecutionLog::from).collect())
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
