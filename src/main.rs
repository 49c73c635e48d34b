//! Stencil - run named, parameterized SQL templates with an audit trail.

use anyhow::Context;
use sql_stencil::cli::Cli;
use sql_stencil::commands::{dispatch, CommandContext, CommandOutput};
use sql_stencil::config::Config;
use sql_stencil::persistence::StateDb;
use sql_stencil::{db, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    match run(cli).await {
        Ok(output) => {
            println!("{}", output.render());
            std::process::exit(output.exit_code);
        }
        Err(e) => {
            error!("{e:#}");
            println!("{}", CommandOutput::error_message(format!("{e:#}")).render());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<CommandOutput> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path).context("Failed to load configuration")?;

    let state_path = match &cli.state {
        Some(path) => path.clone(),
        None => config.state_path()?,
    };
    let state = StateDb::open(&state_path)
        .await
        .with_context(|| format!("Failed to open state database {}", state_path.display()))?;

    let target = if cli.needs_database() {
        let connection = config
            .resolve_connection(cli.connection_string.as_deref(), cli.connection_name())
            .context("No usable database connection")?;
        info!("Connecting to {}", connection.display_string());
        Some(db::connect(&connection, &config.execution).await?)
    } else {
        None
    };

    let ctx = CommandContext {
        templates: &state,
        audit: &state,
        db: target.as_deref(),
    };
    let output = dispatch(&ctx, &cli.command).await;

    if let Some(client) = &target {
        client.close().await?;
    }
    state.close().await;

    Ok(output)
}
