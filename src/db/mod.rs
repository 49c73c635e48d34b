//! Database abstraction layer for Stencil.
//!
//! Provides a trait-based interface for executing bound statements, allowing
//! different database backends to be used interchangeably.

mod mock;
mod mysql;
mod postgres;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{BackendResponse, BoundStatement, Parameters, PlaceholderStyle, Row, Value};

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend, if it listens on one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the bind placeholder syntax the driver understands.
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::Postgres => PlaceholderStyle::Numbered,
            Self::MySql | Self::Sqlite => PlaceholderStyle::Positional,
        }
    }

    /// Returns the most bind parameters a single statement may carry.
    pub fn max_bind_params(&self) -> usize {
        match self {
            Self::Postgres | Self::MySql => 65_535,
            Self::Sqlite => 32_766,
        }
    }
}

/// Creates a database client for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(
    config: &ConnectionConfig,
    execution: &ExecutionConfig,
) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config, execution).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::MySql => {
            let client = MySqlClient::connect(config, execution).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config, execution).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with StencilError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Which backend family this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Executes a bound statement once and returns the backend's response.
    ///
    /// Failures are reported as `StencilError::Backend` carrying the backend's
    /// own message. Statements are never retried.
    async fn execute(&self, statement: &BoundStatement) -> Result<BackendResponse>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

/// Binds every parameter to the query through the driver's own encoding.
pub(crate) fn bind_values<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &[Value],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Runs `attempt` until it succeeds, retrying transient failures with
/// exponential backoff.
pub(crate) async fn connect_with_retry<T, F, Fut>(mut attempt: F) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt_number = 1;

    loop {
        debug!("Connection attempt {} of {}", attempt_number, MAX_RETRY_ATTEMPTS);

        match attempt().await {
            Ok(pool) => {
                debug!("Successfully connected to database");
                return Ok(pool);
            }
            Err(e) if attempt_number < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                warn!(
                    "Connection attempt {} failed (transient error), retrying in {:?}",
                    attempt_number, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt_number += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    // Authentication and database-not-found errors are not transient
    if error_str.contains("authentication failed")
        || error_str.contains("access denied")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}
