//! Command handlers for Stencil.
//!
//! Each handler takes a command context and returns a `CommandOutput`; none of
//! them print or exit.

pub mod execute;
pub mod logs;
pub mod templates;

use super::CommandOutput;
use crate::cli::Command;
use crate::db::DatabaseClient;
use crate::persistence::{AuditStore, TemplateStore};

/// Context provided to command handlers.
pub struct CommandContext<'a> {
    pub templates: &'a dyn TemplateStore,
    pub audit: &'a dyn AuditStore,
    /// Target database. Only `exec` needs one.
    pub db: Option<&'a dyn DatabaseClient>,
}

/// Routes a parsed command to its handler.
pub async fn dispatch(ctx: &CommandContext<'_>, command: &Command) -> CommandOutput {
    match command {
        Command::List => templates::handle_list(ctx).await,
        Command::Show { identifier } => templates::handle_show(ctx, identifier).await,
        Command::Create(args) => templates::handle_create(ctx, args).await,
        Command::Update(args) => templates::handle_update(ctx, args).await,
        Command::Delete { id } => templates::handle_delete(ctx, id).await,
        Command::Exec(args) => execute::handle_exec(ctx, args).await,
        Command::Logs(args) => logs::handle_logs(ctx, args).await,
    }
}
