//! State database behavior across a real file on disk.

use pretty_assertions::assert_eq;
use serde_json::json;
use sql_stencil::db::{Parameters, Value};
use sql_stencil::error::StencilError;
use sql_stencil::persistence::{
    AuditStore, ExecutionStatus, NewExecutionLog, NewTemplate, StateDb, TemplateStore,
    TemplateUpdate, ANONYMOUS,
};

fn new_template(name: &str) -> NewTemplate {
    NewTemplate {
        name: name.to_string(),
        body: "SELECT * FROM users WHERE id = :id".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_templates_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");

    let id = {
        let db = StateDb::open(&path).await.unwrap();
        let created = db
            .create(&NewTemplate {
                description: Some("by id".to_string()),
                parameter_spec: Some(json!({"id": "integer"})),
                created_by: Some("alice".to_string()),
                ..new_template("user_by_id")
            })
            .await
            .unwrap();
        db.close().await;
        created.id
    };

    let db = StateDb::open(&path).await.unwrap();
    let fetched = db.get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "user_by_id");
    assert_eq!(fetched.description.as_deref(), Some("by id"));
    assert_eq!(fetched.parameter_spec, json!({"id": "integer"}));
    assert_eq!(fetched.created_by, "alice");
    assert!(fetched.is_active);
    assert_eq!(db.path(), Some(path.as_path()));
}

#[tokio::test]
async fn test_defaults_on_create() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();

    let created = db.create(&new_template("  padded  ")).await.unwrap();
    assert_eq!(created.name, "padded");
    assert_eq!(created.parameter_spec, json!({}));
    assert_eq!(created.created_by, ANONYMOUS);
    assert_eq!(created.created_at, created.updated_at);
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();

    db.create(&new_template("dup")).await.unwrap();
    let error = db.create(&new_template("dup")).await.unwrap_err();
    assert!(matches!(error, StencilError::DuplicateName(_)));
}

#[tokio::test]
async fn test_soft_delete_hides_from_lookup_but_keeps_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();

    let a = db.create(&new_template("alpha")).await.unwrap();
    db.create(&new_template("beta")).await.unwrap();

    assert!(db.soft_delete(&a.id).await.unwrap());
    assert!(db.find_active("alpha").await.unwrap().is_none());
    assert!(db.find_active(&a.id).await.unwrap().is_none());

    let kept = db.get(&a.id).await.unwrap().unwrap();
    assert!(!kept.is_active);

    let names: Vec<_> = db
        .list_active()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["beta".to_string()]);

    assert!(!db.soft_delete("no-such-id").await.unwrap());
}

#[tokio::test]
async fn test_update_can_reactivate_and_clear_description() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();

    let created = db
        .create(&NewTemplate {
            description: Some("old".to_string()),
            ..new_template("toggle")
        })
        .await
        .unwrap();
    db.soft_delete(&created.id).await.unwrap();

    let updated = db
        .update(
            &created.id,
            &TemplateUpdate {
                description: Some(None),
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert!(updated.is_active);
    assert_eq!(updated.description, None);
    assert_eq!(updated.body, created.body);
    assert!(db.find_active("toggle").await.unwrap().is_some());
}

#[tokio::test]
async fn test_logs_page_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();
    let template = db.create(&new_template("paged")).await.unwrap();

    let mut params = Parameters::new();
    params.insert("id".to_string(), Value::Int(7));

    for i in 0..5u64 {
        db.append(&NewExecutionLog::success(
            template.id.clone(),
            format!("caller-{i}"),
            &params,
            i,
            1,
        ))
        .await
        .unwrap();
    }
    db.append(&NewExecutionLog::failure(
        template.id.clone(),
        "caller-5",
        &params,
        3,
        "boom",
    ))
    .await
    .unwrap();

    let first = db.list_by_template(&template.id, Some(2), None).await.unwrap();
    let callers: Vec<_> = first.iter().map(|l| l.executed_by.as_str()).collect();
    assert_eq!(callers, vec!["caller-5", "caller-4"]);
    assert_eq!(first[0].status, ExecutionStatus::Error);
    assert_eq!(first[0].error_message.as_deref(), Some("boom"));
    assert_eq!(first[0].rows_affected, None);
    assert_eq!(first[0].parameters_used, json!({"id": 7}));

    let second = db
        .list_by_template(&template.id, Some(2), Some(2))
        .await
        .unwrap();
    let callers: Vec<_> = second.iter().map(|l| l.executed_by.as_str()).collect();
    assert_eq!(callers, vec!["caller-3", "caller-2"]);

    let all = db.list_by_template(&template.id, None, None).await.unwrap();
    assert_eq!(all.len(), 6);
}

#[tokio::test]
async fn test_logs_outlive_soft_delete() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();
    let template = db.create(&new_template("audited")).await.unwrap();

    db.append(&NewExecutionLog::success(
        template.id.clone(),
        ANONYMOUS,
        &Parameters::new(),
        1,
        0,
    ))
    .await
    .unwrap();
    db.soft_delete(&template.id).await.unwrap();

    let logs = db.list_by_template(&template.id, None, None).await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_partial_updates_keep_both_fields() {
    let dir = tempfile::tempdir().unwrap();
    let db = StateDb::open(&dir.path().join("state.db")).await.unwrap();

    for i in 0..25 {
        let created = db.create(&new_template(&format!("t{i}"))).await.unwrap();
        let rename = TemplateUpdate {
            name: Some(format!("renamed{i}")),
            ..Default::default()
        };
        let rebody = TemplateUpdate {
            body: Some(format!("SELECT {i}")),
            ..Default::default()
        };

        let (a, b) = tokio::join!(
            db.update(&created.id, &rename),
            db.update(&created.id, &rebody)
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let stored = db.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.name, format!("renamed{i}"));
        assert_eq!(stored.body, format!("SELECT {i}"));
    }
}
