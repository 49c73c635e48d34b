//! MySQL adapter and engine runs against a live server.
//!
//! Skipped unless MYSQL_URL points at MySQL.

use sql_stencil::config::{ConnectionConfig, ExecutionConfig};
use sql_stencil::db::{
    self, BackendResponse, BoundStatement, DatabaseBackend, DatabaseClient, Parameters, Value,
};
use sql_stencil::error::StencilError;
use sql_stencil::persistence::{AuditStore, NewTemplate, StateDb, TemplateStore};
use sql_stencil::query::QueryExecutor;

async fn get_test_client() -> Option<Box<dyn DatabaseClient>> {
    let url = std::env::var("MYSQL_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    if config.backend != DatabaseBackend::MySql {
        return None;
    }
    db::connect(&config, &ExecutionConfig::default()).await.ok()
}

fn table_name() -> String {
    format!("stencil_test_{}", uuid::Uuid::new_v4().simple())
}

async fn create_table(client: &dyn DatabaseClient, table: &str) {
    client
        .execute(&BoundStatement::raw(format!(
            "CREATE TABLE {table} (id INT PRIMARY KEY AUTO_INCREMENT, email VARCHAR(255) NOT NULL, \
             visits BIGINT UNSIGNED, score FLOAT, payload BLOB)"
        )))
        .await
        .unwrap();
}

async fn drop_table(client: &dyn DatabaseClient, table: &str) {
    client
        .execute(&BoundStatement::raw(format!("DROP TABLE {table}")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mysql_insert_reports_rows_affected() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: MYSQL_URL not set");
        return;
    };
    let table = table_name();
    create_table(client.as_ref(), &table).await;

    let response = client
        .execute(&BoundStatement {
            sql: format!("INSERT INTO {table} (email) VALUES (?), (?)"),
            params: vec![Value::from("a@b.com"), Value::from("c@d.com")],
        })
        .await
        .unwrap();
    assert_eq!(
        response,
        BackendResponse::Rows {
            rows: vec![],
            rows_affected: Some(2)
        }
    );

    drop_table(client.as_ref(), &table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mysql_select_returns_result_set() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: MYSQL_URL not set");
        return;
    };
    let table = table_name();
    create_table(client.as_ref(), &table).await;
    client
        .execute(&BoundStatement {
            sql: format!(
                "INSERT INTO {table} (email, visits, score, payload) VALUES (?, ?, ?, ?)"
            ),
            params: vec![
                Value::from("a@b.com"),
                Value::Int(7),
                Value::Float(1.5),
                Value::Bytes(vec![1, 2, 3]),
            ],
        })
        .await
        .unwrap();

    let response = client
        .execute(&BoundStatement::raw(format!(
            "SELECT id, email, visits, score, payload FROM {table}"
        )))
        .await
        .unwrap();

    let BackendResponse::ResultSets(sets) = response else {
        panic!("Expected ResultSets response, got {:?}", response);
    };
    assert_eq!(sets.len(), 1);
    let row = &sets[0][0];
    assert_eq!(row.get("id"), Some(&Value::Int(1)));
    assert_eq!(row.get("email"), Some(&Value::from("a@b.com")));
    assert_eq!(row.get("visits"), Some(&Value::Int(7)));
    assert_eq!(row.get("score"), Some(&Value::Float(1.5)));
    assert_eq!(row.get("payload"), Some(&Value::Bytes(vec![1, 2, 3])));

    drop_table(client.as_ref(), &table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mysql_syntax_error_is_backend_error() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: MYSQL_URL not set");
        return;
    };

    let error = client
        .execute(&BoundStatement::raw("SELEC 1"))
        .await
        .unwrap_err();
    assert!(matches!(error, StencilError::Backend(_)));
    assert!(error.detail().contains("SQL syntax"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mysql_engine_run_is_normalized_and_logged() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: MYSQL_URL not set");
        return;
    };
    let table = table_name();
    create_table(client.as_ref(), &table).await;

    let state = StateDb::open_in_memory().await.unwrap();
    state
        .create(&NewTemplate {
            name: "add".to_string(),
            body: format!("INSERT INTO {table} (email) VALUES (:email)"),
            ..Default::default()
        })
        .await
        .unwrap();
    let find = state
        .create(&NewTemplate {
            name: "find".to_string(),
            body: format!("SELECT email FROM {table} WHERE email = :email OR :email IS NULL"),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut params = Parameters::new();
    params.insert("email".to_string(), Value::from("x'); DROP TABLE t;--"));

    let executor = QueryExecutor::new(&state, client.as_ref(), &state);
    let inserted = executor.execute("add", &params, None).await.unwrap();
    assert_eq!(inserted.rows_affected, 1);

    let found = executor.execute("find", &params, None).await.unwrap();
    assert_eq!(found.rows.len(), 1);
    assert_eq!(found.rows_affected, 1);
    assert_eq!(
        found.rows[0].get("email"),
        Some(&Value::from("x'); DROP TABLE t;--"))
    );

    let logs = state.list_by_template(&find.id, None, None).await.unwrap();
    assert_eq!(logs.len(), 1);

    drop_table(client.as_ref(), &table).await;
    client.close().await.unwrap();
}
