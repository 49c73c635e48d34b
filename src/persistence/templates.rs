//! Query template persistence.
//!
//! Templates are never hard-deleted; deleting one clears `is_active`, which
//! hides it from lookup and listing.

use super::ANONYMOUS;
use crate::error::{StencilError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{FromRow, QueryBuilder};
use uuid::Uuid;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// A stored query template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub id: String,
    pub name: String,
    pub body: String,
    pub description: Option<String>,
    /// Advisory description of expected parameters. Never enforced.
    pub parameter_spec: serde_json::Value,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
struct QueryTemplateRow {
    id: String,
    name: String,
    body: String,
    description: Option<String>,
    parameter_spec: String,
    is_active: bool,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl QueryTemplateRow {
    fn into_template(self) -> Result<QueryTemplate> {
        let parameter_spec = serde_json::from_str(&self.parameter_spec).map_err(|e| {
            StencilError::persistence(format!(
                "Template {} has an unreadable parameter spec: {e}",
                self.id
            ))
        })?;

        Ok(QueryTemplate {
            id: self.id,
            name: self.name,
            body: self.body,
            description: self.description,
            parameter_spec,
            is_active: self.is_active,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fields for a new template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub body: String,
    pub description: Option<String>,
    /// Defaults to `{}`.
    pub parameter_spec: Option<serde_json::Value>,
    /// Defaults to the anonymous sentinel.
    pub created_by: Option<String>,
}

/// A partial update. `None` leaves a field unchanged.
///
/// `description` is doubly optional: `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub body: Option<String>,
    pub description: Option<Option<String>>,
    pub parameter_spec: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

impl TemplateUpdate {
    /// Returns true if no field would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.body.is_none()
            && self.description.is_none()
            && self.parameter_spec.is_none()
            && self.is_active.is_none()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StencilError::validation("Name is required"));
    }
    if Uuid::parse_str(name.trim()).is_ok() {
        return Err(StencilError::validation(format!(
            "Name '{name}' looks like a template id; choose a different name"
        )));
    }
    Ok(())
}

fn validate_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(StencilError::validation("SQL query is required"));
    }
    Ok(())
}

fn encode_spec(spec: &serde_json::Value) -> Result<String> {
    serde_json::to_string(spec)
        .map_err(|e| StencilError::validation(format!("Invalid parameter spec: {e}")))
}

fn map_write_error(error: sqlx::Error, name: &str, action: &str) -> StencilError {
    match error.as_database_error() {
        Some(db_error) if db_error.is_unique_violation() => StencilError::duplicate_name(name),
        _ => StencilError::persistence(format!("Failed to {action}: {error}")),
    }
}

const TEMPLATE_COLUMNS: &str = "id, name, body, description, parameter_spec, is_active, \
                                created_by, created_at, updated_at";

/// Creates a template and returns it as stored.
pub async fn create_template(pool: &SqlitePool, template: &NewTemplate) -> Result<QueryTemplate> {
    validate_name(&template.name)?;
    validate_body(&template.body)?;

    let id = Uuid::new_v4().to_string();
    let name = template.name.trim();
    let spec = encode_spec(
        template
            .parameter_spec
            .as_ref()
            .unwrap_or(&serde_json::Value::Object(Default::default())),
    )?;
    let created_by = template
        .created_by
        .as_deref()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or(ANONYMOUS);

    sqlx::query(
        r#"
        INSERT INTO query_templates (id, name, body, description, parameter_spec, created_by)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(&template.body)
    .bind(&template.description)
    .bind(&spec)
    .bind(created_by)
    .execute(pool)
    .await
    .map_err(|e| map_write_error(e, name, "create template"))?;

    get_template(pool, &id)
        .await?
        .ok_or_else(|| StencilError::internal(format!("Template {id} vanished after insert")))
}

/// Gets a template by id, active or not.
pub async fn get_template(pool: &SqlitePool, id: &str) -> Result<Option<QueryTemplate>> {
    let row: Option<QueryTemplateRow> =
        sqlx::query_as(&format!("SELECT {TEMPLATE_COLUMNS} FROM query_templates WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| StencilError::persistence(format!("Failed to get template: {e}")))?;

    row.map(QueryTemplateRow::into_template).transpose()
}

/// Resolves an identifier to an active template.
///
/// An id match takes precedence over a name match.
pub async fn find_active_template(
    pool: &SqlitePool,
    identifier: &str,
) -> Result<Option<QueryTemplate>> {
    for column in ["id", "name"] {
        let row: Option<QueryTemplateRow> = sqlx::query_as(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM query_templates WHERE {column} = ? AND is_active = 1"
        ))
        .bind(identifier)
        .fetch_optional(pool)
        .await
        .map_err(|e| StencilError::persistence(format!("Failed to look up template: {e}")))?;

        if let Some(row) = row {
            return row.into_template().map(Some);
        }
    }
    Ok(None)
}

/// Applies a partial update. Returns `None` if the id is unknown.
///
/// Only the supplied columns appear in the `SET` list, so concurrent updates
/// to different fields do not overwrite each other.
pub async fn update_template(
    pool: &SqlitePool,
    id: &str,
    update: &TemplateUpdate,
) -> Result<Option<QueryTemplate>> {
    if let Some(name) = &update.name {
        validate_name(name)?;
    }
    if let Some(body) = &update.body {
        validate_body(body)?;
    }
    let spec = update.parameter_spec.as_ref().map(encode_spec).transpose()?;
    let name = update.name.as_deref().map(str::trim);

    let mut query = QueryBuilder::<Sqlite>::new("UPDATE query_templates SET ");
    let mut set = query.separated(", ");
    if let Some(name) = name {
        set.push("name = ").push_bind_unseparated(name.to_string());
    }
    if let Some(body) = &update.body {
        set.push("body = ").push_bind_unseparated(body.clone());
    }
    if let Some(description) = &update.description {
        set.push("description = ")
            .push_bind_unseparated(description.clone());
    }
    if let Some(spec) = spec {
        set.push("parameter_spec = ").push_bind_unseparated(spec);
    }
    if let Some(is_active) = update.is_active {
        set.push("is_active = ").push_bind_unseparated(is_active);
    }
    set.push(format!("updated_at = {NOW}"));

    query.push(" WHERE id = ").push_bind(id.to_string());
    query.push(format!(" RETURNING {TEMPLATE_COLUMNS}"));

    let row: Option<QueryTemplateRow> = query
        .build_query_as()
        .fetch_optional(pool)
        .await
        .map_err(|e| map_write_error(e, name.unwrap_or(id), "update template"))?;

    row.map(QueryTemplateRow::into_template).transpose()
}

/// Marks a template inactive. Returns false if the id is unknown.
pub async fn soft_delete_template(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query(&format!(
        "UPDATE query_templates SET is_active = 0, updated_at = {NOW} WHERE id = ?"
    ))
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| StencilError::persistence(format!("Failed to delete template: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Lists active templates ordered by name.
pub async fn list_active_templates(pool: &SqlitePool) -> Result<Vec<QueryTemplate>> {
    let rows: Vec<QueryTemplateRow> = sqlx::query_as(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM query_templates WHERE is_active = 1 ORDER BY name ASC"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| StencilError::persistence(format!("Failed to list templates: {e}")))?;

    rows.into_iter().map(QueryTemplateRow::into_template).collect()
}
