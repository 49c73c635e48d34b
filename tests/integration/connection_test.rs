//! Target database resolution from config files and connection strings.

use sql_stencil::config::{Config, ConnectionConfig, ExecutionConfig};
use sql_stencil::db::{self, BackendResponse, BoundStatement, DatabaseBackend};
use sql_stencil::error::StencilError;
use std::path::Path;

fn write_config(dir: &Path, content: &str) -> Config {
    let path = dir.join("config.toml");
    std::fs::write(&path, content).unwrap();
    Config::load_from_file(&path).unwrap()
}

#[tokio::test]
async fn test_default_connection_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.db");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
[execution]
timeout_secs = 5

[connections.default]
backend = "sqlite"
url = "sqlite:{}?mode=rwc"
"#,
            target.display()
        ),
    );

    let resolved = config.resolve_connection(None, None).unwrap();
    assert_eq!(resolved.backend, DatabaseBackend::Sqlite);
    assert_eq!(config.execution.timeout_secs, 5);

    let client = db::connect(&resolved, &config.execution).await.unwrap();
    assert_eq!(client.backend(), DatabaseBackend::Sqlite);
    let response = client
        .execute(&BoundStatement::raw("SELECT 1 AS one"))
        .await
        .unwrap();
    match response {
        BackendResponse::Plain(rows) => assert_eq!(rows.len(), 1),
        other => panic!("Unexpected response shape: {:?}", other),
    }
    client.close().await.unwrap();
    assert!(target.exists());
}

#[tokio::test]
async fn test_named_connection_and_cli_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[connections.reporting]
backend = "postgres"
host = "reports.internal"
database = "reports"
user = "reader"
"#,
    );

    let named = config.resolve_connection(None, Some("reporting")).unwrap();
    assert_eq!(named.host.as_deref(), Some("reports.internal"));
    assert_eq!(named.effective_port(), Some(5432));

    let cli = config
        .resolve_connection(Some("sqlite::memory:"), Some("reporting"))
        .unwrap();
    assert_eq!(cli.backend, DatabaseBackend::Sqlite);

    let error = config.resolve_connection(None, Some("missing")).unwrap_err();
    assert!(matches!(error, StencilError::Config(_)));
}

#[tokio::test]
async fn test_state_path_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("custom-state.db");
    let config = write_config(
        dir.path(),
        &format!("[state]\npath = \"{}\"\n", state.display()),
    );
    assert_eq!(config.state_path().unwrap(), state);
}

#[tokio::test]
async fn test_missing_sqlite_file_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent").join("nope.db");
    let config =
        ConnectionConfig::from_connection_string(&format!("sqlite:{}", missing.display()))
            .unwrap();

    let error = match db::connect(&config, &ExecutionConfig::default()).await {
        Ok(_) => panic!("Expected connection to fail"),
        Err(e) => e,
    };
    assert!(matches!(error, StencilError::Connection(_)));
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();
    assert!(config.connections.is_empty());
    assert_eq!(config.execution.timeout_secs, 30);
}
