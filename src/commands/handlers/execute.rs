//! Template execution handler (`exec`).

use serde_json::json;

use super::CommandContext;
use crate::cli::ExecArgs;
use crate::commands::CommandOutput;
use crate::error::StencilError;
use crate::query::QueryExecutor;

/// Handle `exec <identifier>`.
pub async fn handle_exec(ctx: &CommandContext<'_>, args: &ExecArgs) -> CommandOutput {
    let Some(db) = ctx.db else {
        return CommandOutput::error_message("No database connection available");
    };

    let parameters = match args.parameters() {
        Ok(p) => p,
        Err(e) => return CommandOutput::from_error(&e),
    };

    let executor = QueryExecutor::new(ctx.templates, db, ctx.audit);
    match executor
        .execute(&args.identifier, &parameters, args.caller.as_deref())
        .await
    {
        Ok(outcome) => CommandOutput::success(json!({
            "success": true,
            "data": outcome.rows,
            "metadata": {
                "query_name": outcome.query_name,
                "execution_time_ms": outcome.execution_time_ms,
                "rows_affected": outcome.rows_affected,
            }
        })),
        Err(e @ StencilError::Execution { .. }) => CommandOutput::failure(json!({
            "success": false,
            "error": e.detail(),
            "metadata": {
                "execution_time_ms": e.execution_time_ms(),
            }
        })),
        Err(e) => CommandOutput::from_error(&e),
    }
}
