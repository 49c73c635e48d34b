//! Persistence layer for Stencil.
//!
//! Manages the local SQLite state database that holds query templates and
//! their execution logs.

mod execution_logs;
mod migrations;
mod templates;

pub use execution_logs::{ExecutionLog, ExecutionStatus, NewExecutionLog};
pub use templates::{NewTemplate, QueryTemplate, TemplateUpdate};

use crate::error::{StencilError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Identity recorded when the caller did not supply one.
pub const ANONYMOUS: &str = "anonymous";

/// Storage the execution engine resolves templates from.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Resolves an id or name to an active template.
    async fn find_active(&self, identifier: &str) -> Result<Option<QueryTemplate>>;

    /// Fetches a template by id whether or not it is active.
    async fn get(&self, id: &str) -> Result<Option<QueryTemplate>>;

    async fn create(&self, template: &NewTemplate) -> Result<QueryTemplate>;

    /// Returns `None` if the id is unknown.
    async fn update(&self, id: &str, update: &TemplateUpdate) -> Result<Option<QueryTemplate>>;

    /// Returns `false` if the id is unknown.
    async fn soft_delete(&self, id: &str) -> Result<bool>;

    /// Active templates ordered by name.
    async fn list_active(&self) -> Result<Vec<QueryTemplate>>;
}

/// Append-only storage for execution logs.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &NewExecutionLog) -> Result<ExecutionLog>;

    /// Entries for one template, newest first.
    async fn list_by_template(
        &self,
        query_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ExecutionLog>>;
}

/// Main persistence interface for the application state database.
pub struct StateDb {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl StateDb {
    /// Opens or creates the state database at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        match Self::try_open(path).await {
            Ok(db) => Ok(db),
            Err(e) => {
                warn!("Failed to open state database: {e}. Attempting recovery...");
                Self::attempt_recovery(path).await
            }
        }
    }

    /// Opens a private in-memory state database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StencilError::persistence(format!("Invalid database path: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                StencilError::persistence(format!("Failed to open in-memory database: {e}"))
            })?;
        migrations::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            db_path: None,
        })
    }

    /// Returns the default state database path for the current platform.
    ///
    /// - Linux: `~/.config/sql-stencil/state.db`
    /// - macOS: `~/Library/Application Support/sql-stencil/state.db`
    /// - Windows: `%APPDATA%\sql-stencil\state.db`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            StencilError::persistence("Could not determine config directory")
        })?;
        Ok(config_dir.join("sql-stencil").join("state.db"))
    }

    /// Attempts to open the database with retries for lock contention.
    async fn try_open(path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("State database opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StencilError::persistence("Failed to open database after retries")
        }))
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| StencilError::persistence(format!("Invalid database path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                StencilError::persistence(format!("Failed to connect to state database: {e}"))
            })
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StencilError::persistence(format!(
                    "Failed to create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Moves an unreadable database aside and starts a fresh one.
    async fn attempt_recovery(path: &Path) -> Result<Self> {
        let backup_path = path.with_extension("db.bak");

        if path.exists() {
            std::fs::rename(path, &backup_path).map_err(|e| {
                StencilError::persistence(format!(
                    "Failed to backup corrupted database to {}: {e}",
                    backup_path.display()
                ))
            })?;
            warn!("Backed up corrupted database to {}", backup_path.display());
        }

        Self::try_open(path).await.map_err(|e| {
            StencilError::persistence(format!("Failed to recreate database after backup: {e}"))
        })
    }

    /// Returns the path to the state database, or `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TemplateStore for StateDb {
    async fn find_active(&self, identifier: &str) -> Result<Option<QueryTemplate>> {
        templates::find_active_template(&self.pool, identifier).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueryTemplate>> {
        templates::get_template(&self.pool, id).await
    }

    async fn create(&self, template: &NewTemplate) -> Result<QueryTemplate> {
        templates::create_template(&self.pool, template).await
    }

    async fn update(&self, id: &str, update: &TemplateUpdate) -> Result<Option<QueryTemplate>> {
        templates::update_template(&self.pool, id, update).await
    }

    async fn soft_delete(&self, id: &str) -> Result<bool> {
        templates::soft_delete_template(&self.pool, id).await
    }

    async fn list_active(&self) -> Result<Vec<QueryTemplate>> {
        templates::list_active_templates(&self.pool).await
    }
}

#[async_trait]
impl AuditStore for StateDb {
    async fn append(&self, entry: &NewExecutionLog) -> Result<ExecutionLog> {
        execution_logs::append_log(&self.pool, entry).await
    }

    async fn list_by_template(
        &self,
        query_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ExecutionLog>> {
        execution_logs::list_logs_by_template(&self.pool, query_id, limit, offset).await
    }
}
