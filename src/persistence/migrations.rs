//! Schema versioning and migrations for the state database.
//!
//! Forward-only: each version is applied once and recorded in
//! `schema_versions`.

use crate::error::{StencilError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(StencilError::persistence(format!(
            "Database schema version ({}) is newer than supported version ({}). \
             Please upgrade Stencil to the latest version.",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating state database from version {} to {}",
            current, CURRENT_VERSION
        );
        for version in (current + 1)..=CURRENT_VERSION {
            run_migration(pool, version).await?;
            record_version(pool, version).await?;
            info!("Applied migration v{}", version);
        }
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        StencilError::persistence(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

/// Gets the current schema version (0 for a fresh database).
async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| StencilError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| StencilError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(StencilError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: templates, execution logs and the log lookup index.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS query_templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            body TEXT NOT NULL,
            description TEXT,
            parameter_spec TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_by TEXT NOT NULL DEFAULT 'anonymous',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS execution_logs (
            id TEXT PRIMARY KEY,
            query_id TEXT REFERENCES query_templates(id),
            executed_by TEXT NOT NULL,
            parameters_used TEXT NOT NULL DEFAULT '{}',
            execution_time_ms INTEGER NOT NULL,
            rows_affected INTEGER,
            error_message TEXT,
            status TEXT NOT NULL CHECK (status IN ('success', 'error')),
            executed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_execution_logs_query_executed
        ON execution_logs(query_id, executed_at)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StencilError::persistence(format!("Migration v1 failed: {e}")))?;
    }

    Ok(())
}
