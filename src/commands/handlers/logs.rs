//! Execution log handler (`logs`).

use super::CommandContext;
use crate::cli::LogsArgs;
use crate::commands::CommandOutput;

/// Handle `logs <id>`.
pub async fn handle_logs(ctx: &CommandContext<'_>, args: &LogsArgs) -> CommandOutput {
    match ctx
        .audit
        .list_by_template(&args.id, args.limit, args.offset)
        .await
    {
        Ok(logs) => CommandOutput::data(&logs),
        Err(e) => CommandOutput::from_error(&e),
    }
}
