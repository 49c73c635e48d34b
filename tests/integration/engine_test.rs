//! End-to-end template execution against a SQLite target database.

use sql_stencil::config::{ConnectionConfig, ExecutionConfig};
use sql_stencil::db::{self, BoundStatement, DatabaseClient, MockDatabaseClient, Parameters, Value};
use sql_stencil::error::StencilError;
use sql_stencil::persistence::{
    AuditStore, ExecutionStatus, NewTemplate, QueryTemplate, StateDb, TemplateStore,
};
use sql_stencil::query::QueryExecutor;
use tempfile::TempDir;

struct Fixture {
    state: StateDb,
    target: Box<dyn DatabaseClient>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let state = StateDb::open(&dir.path().join("state.db")).await.unwrap();

    let target_url = format!("sqlite:{}?mode=rwc", dir.path().join("app.db").display());
    let config = ConnectionConfig::from_connection_string(&target_url).unwrap();
    let target = db::connect(&config, &ExecutionConfig::default()).await.unwrap();

    for sql in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, name TEXT)",
        "INSERT INTO users (email, name) VALUES ('a@b.com', 'Ada'), ('c@d.com', 'Cy'), ('e@f.com', NULL)",
        "CREATE TABLE t (name TEXT)",
    ] {
        target.execute(&BoundStatement::raw(sql)).await.unwrap();
    }

    Fixture {
        state,
        target,
        _dir: dir,
    }
}

async fn register(state: &StateDb, name: &str, body: &str) -> QueryTemplate {
    state
        .create(&NewTemplate {
            name: name.to_string(),
            body: body.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

fn params(pairs: &[(&str, Value)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_count_users_without_parameters() {
    let f = fixture().await;
    let template = register(&f.state, "count_users", "SELECT COUNT(*) AS n FROM users").await;

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let outcome = executor
        .execute("count_users", &Parameters::new(), None)
        .await
        .unwrap();

    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].get("n"), Some(&Value::Int(3)));
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(outcome.query_name, "count_users");

    let logs = f.state.list_by_template(&template.id, None, None).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, ExecutionStatus::Success);
    assert_eq!(logs[0].rows_affected, Some(1));
}

#[tokio::test]
async fn test_find_by_email_binds_value() {
    let f = fixture().await;
    register(
        &f.state,
        "find_by_email",
        "SELECT id, name FROM users WHERE email = :email",
    )
    .await;

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let outcome = executor
        .execute(
            "find_by_email",
            &params(&[("email", Value::from("a@b.com"))]),
            Some("alice"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].get("name"), Some(&Value::from("Ada")));
}

#[tokio::test]
async fn test_injection_payload_is_inert() {
    let f = fixture().await;
    register(&f.state, "find_t", "SELECT name FROM t WHERE name = :name").await;
    register(&f.state, "add_t", "INSERT INTO t (name) VALUES (:name)").await;

    let payload = params(&[("name", Value::from("x'); DROP TABLE t;--"))]);
    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);

    let inserted = executor.execute("add_t", &payload, None).await.unwrap();
    assert_eq!(inserted.rows_affected, 0);

    let found = executor.execute("find_t", &payload, None).await.unwrap();
    assert_eq!(found.rows.len(), 1);
    assert_eq!(
        found.rows[0].get("name"),
        Some(&Value::from("x'); DROP TABLE t;--"))
    );
}

#[tokio::test]
async fn test_whole_word_placeholders_bind_independently() {
    let f = fixture().await;
    register(
        &f.state,
        "by_id_and_ident",
        "SELECT :id AS a, :identifier AS b",
    )
    .await;

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let outcome = executor
        .execute(
            "by_id_and_ident",
            &params(&[("id", Value::Int(1)), ("identifier", Value::from("two"))]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.rows[0].get("a"), Some(&Value::Int(1)));
    assert_eq!(outcome.rows[0].get("b"), Some(&Value::from("two")));
}

#[tokio::test]
async fn test_unknown_identifier_writes_no_log() {
    let f = fixture().await;
    let template = register(&f.state, "q", "SELECT 1").await;

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let error = executor
        .execute("does-not-exist", &Parameters::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(error, StencilError::NotFound(_)));
    let logs = f.state.list_by_template(&template.id, None, None).await.unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_leftover_placeholder_fails_on_sqlite_and_is_logged() {
    let f = fixture().await;
    let lone = register(
        &f.state,
        "lone_missing",
        "SELECT * FROM users WHERE email = :missing",
    )
    .await;
    let mixed = register(&f.state, "mixed", "SELECT :missing AS m, :email AS e").await;

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);

    let error = executor
        .execute("lone_missing", &Parameters::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(error, StencilError::Execution { .. }));
    assert!(error.detail().contains(":missing"));

    let error = executor
        .execute(
            "mixed",
            &params(&[("email", Value::from("a@b.com"))]),
            Some("carol"),
        )
        .await
        .unwrap_err();
    assert!(error.detail().contains(":missing"));

    for template in [&lone, &mixed] {
        let logs = f.state.list_by_template(&template.id, None, None).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, ExecutionStatus::Error);
        let message = logs[0].error_message.as_deref().unwrap();
        assert!(message.contains(":missing"));
    }
}

#[tokio::test]
async fn test_unresolved_placeholder_reaches_backend_verbatim() {
    let f = fixture().await;
    let template = register(
        &f.state,
        "needs_missing",
        "SELECT * FROM users WHERE email = :missing",
    )
    .await;
    let mock = MockDatabaseClient::new();

    let executor = QueryExecutor::new(&f.state, &mock, &f.state);
    let error = executor
        .execute("needs_missing", &Parameters::new(), None)
        .await
        .unwrap_err();

    assert!(mock.statements()[0].sql.contains(":missing"));
    assert!(error.detail().contains(":missing"));

    let logs = f.state.list_by_template(&template.id, None, None).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, ExecutionStatus::Error);
}

#[tokio::test]
async fn test_backend_error_is_logged_with_message() {
    let f = fixture().await;
    let template = register(&f.state, "bad_table", "SELECT * FROM no_such_table").await;

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let error = executor
        .execute("bad_table", &Parameters::new(), None)
        .await
        .unwrap_err();

    assert!(error.detail().contains("no_such_table"));
    assert!(error.execution_time_ms().is_some());

    let logs = f.state.list_by_template(&template.id, None, None).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].error_message.as_deref(), Some(error.detail()));
}

#[tokio::test]
async fn test_soft_deleted_template_cannot_run() {
    let f = fixture().await;
    let template = register(&f.state, "retired", "SELECT 1").await;
    assert!(f.state.soft_delete(&template.id).await.unwrap());

    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let error = executor
        .execute("retired", &Parameters::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(error, StencilError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_executions_each_log_once() {
    let f = fixture().await;
    let template = register(&f.state, "count_users", "SELECT COUNT(*) AS n FROM users").await;
    let executor = QueryExecutor::new(&f.state, f.target.as_ref(), &f.state);
    let empty = Parameters::new();

    let (a, b, c) = tokio::join!(
        executor.execute("count_users", &empty, Some("a")),
        executor.execute(&template.id, &empty, Some("b")),
        executor.execute("count_users", &empty, Some("c")),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let logs = f.state.list_by_template(&template.id, None, None).await.unwrap();
    assert_eq!(logs.len(), 3);
}
