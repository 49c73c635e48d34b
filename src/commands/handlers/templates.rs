//! Template management handlers (list, show, create, update, delete).

use serde_json::json;
use tracing::info;

use super::CommandContext;
use crate::cli::{CreateArgs, UpdateArgs};
use crate::commands::CommandOutput;
use crate::query::placeholders;

/// Handle `list`.
pub async fn handle_list(ctx: &CommandContext<'_>) -> CommandOutput {
    match ctx.templates.list_active().await {
        Ok(templates) => CommandOutput::data(&templates),
        Err(e) => CommandOutput::from_error(&e),
    }
}

/// Handle `show <identifier>`.
pub async fn handle_show(ctx: &CommandContext<'_>, identifier: &str) -> CommandOutput {
    match ctx.templates.find_active(identifier).await {
        Ok(Some(template)) => {
            let names = placeholders(&template.body);
            CommandOutput::success(json!({ "data": template, "placeholders": names }))
        }
        Ok(None) => CommandOutput::error_message("Query not found"),
        Err(e) => CommandOutput::from_error(&e),
    }
}

/// Handle `create`.
pub async fn handle_create(ctx: &CommandContext<'_>, args: &CreateArgs) -> CommandOutput {
    let new_template = match args.to_new_template() {
        Ok(t) => t,
        Err(e) => return CommandOutput::from_error(&e),
    };

    match ctx.templates.create(&new_template).await {
        Ok(template) => {
            info!(id = %template.id, name = %template.name, "Template created");
            CommandOutput::data(&template)
        }
        Err(e) => CommandOutput::from_error(&e),
    }
}

/// Handle `update <id>`.
pub async fn handle_update(ctx: &CommandContext<'_>, args: &UpdateArgs) -> CommandOutput {
    let update = match args.to_update() {
        Ok(u) => u,
        Err(e) => return CommandOutput::from_error(&e),
    };

    match ctx.templates.update(&args.id, &update).await {
        Ok(Some(template)) => {
            info!(id = %template.id, "Template updated");
            CommandOutput::data(&template)
        }
        Ok(None) => CommandOutput::error_message("Query not found"),
        Err(e) => CommandOutput::from_error(&e),
    }
}

/// Handle `delete <id>`.
pub async fn handle_delete(ctx: &CommandContext<'_>, id: &str) -> CommandOutput {
    match ctx.templates.soft_delete(id).await {
        Ok(true) => {
            info!(id, "Template deactivated");
            CommandOutput::success(json!({
                "success": true,
                "message": "Query deleted successfully"
            }))
        }
        Ok(false) => CommandOutput::error_message("Query not found"),
        Err(e) => CommandOutput::from_error(&e),
    }
}
