//! Command-line argument parsing for Stencil.

use crate::db::{Parameters, Value};
use crate::error::{StencilError, Result};
use crate::persistence::{NewTemplate, TemplateUpdate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Run named, parameterized SQL templates with an audit trail.
#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Target database connection string
    /// (postgres://..., mysql://..., sqlite:path)
    #[arg(long = "db", value_name = "CONNECTION_STRING", global = true)]
    pub connection_string: Option<String>,

    /// Use named connection from config
    #[arg(short = 'c', long, value_name = "NAME", global = true)]
    pub connection: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// State database path (overrides the config file)
    #[arg(long, value_name = "PATH", global = true)]
    pub state: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List active templates
    List,

    /// Show one active template and the placeholders it uses
    Show {
        /// Template id or name
        identifier: String,
    },

    /// Register a new template
    Create(CreateArgs),

    /// Change fields of an existing template
    Update(UpdateArgs),

    /// Deactivate a template
    Delete {
        /// Template id
        id: String,
    },

    /// Execute a template
    Exec(ExecArgs),

    /// Show execution logs for a template
    Logs(LogsArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unique template name
    #[arg(long)]
    pub name: String,

    /// SQL body with :name placeholders
    #[arg(long, required_unless_present = "file", conflicts_with = "file")]
    pub body: Option<String>,

    /// Read the SQL body from a file
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    #[arg(long)]
    pub description: Option<String>,

    /// Advisory parameter description as JSON
    #[arg(long, value_name = "JSON")]
    pub parameters: Option<String>,

    /// Identity recorded as the creator
    #[arg(long = "as", value_name = "USER")]
    pub created_by: Option<String>,
}

impl CreateArgs {
    pub fn to_new_template(&self) -> Result<NewTemplate> {
        Ok(NewTemplate {
            name: self.name.clone(),
            body: read_body(self.body.as_deref(), self.file.as_deref())?.unwrap_or_default(),
            description: self.description.clone(),
            parameter_spec: self.parameters.as_deref().map(parse_json).transpose()?,
            created_by: self.created_by.clone(),
        })
    }
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Template id
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, conflicts_with = "file")]
    pub body: Option<String>,

    /// Read the SQL body from a file
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    /// Remove the description
    #[arg(long)]
    pub clear_description: bool,

    /// Advisory parameter description as JSON
    #[arg(long, value_name = "JSON")]
    pub parameters: Option<String>,

    /// Activate or deactivate the template
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub active: Option<bool>,
}

impl UpdateArgs {
    pub fn to_update(&self) -> Result<TemplateUpdate> {
        let description = if self.clear_description {
            Some(None)
        } else {
            self.description.clone().map(Some)
        };

        Ok(TemplateUpdate {
            name: self.name.clone(),
            body: read_body(self.body.as_deref(), self.file.as_deref())?,
            description,
            parameter_spec: self.parameters.as_deref().map(parse_json).transpose()?,
            is_active: self.active,
        })
    }
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Template id or name
    pub identifier: String,

    /// A parameter value; JSON scalars are decoded, anything else is a string
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// All parameters as one JSON object
    #[arg(long = "params", value_name = "JSON")]
    pub params_json: Option<String>,

    /// Identity recorded in the execution log
    #[arg(long = "as", value_name = "USER")]
    pub caller: Option<String>,
}

impl ExecArgs {
    /// Merges `--params` and `-p` values; `-p` wins on conflicts.
    pub fn parameters(&self) -> Result<Parameters> {
        let mut parameters = match &self.params_json {
            Some(json) => parse_parameter_object(json)?,
            None => Parameters::new(),
        };
        for (name, value) in &self.params {
            parameters.insert(name.clone(), value.clone());
        }
        Ok(parameters)
    }
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Template id
    pub id: String,

    /// Maximum entries to return (at most 500)
    #[arg(long)]
    pub limit: Option<i64>,

    /// Entries to skip
    #[arg(long)]
    pub offset: Option<i64>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Returns the named connection to use, if specified.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Returns true if the command talks to the target database.
    pub fn needs_database(&self) -> bool {
        matches!(self.command, Command::Exec(_))
    }
}

/// Parses `name=value` for `-p`.
pub fn parse_param(s: &str) -> std::result::Result<(String, Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{s}'. Expected NAME=VALUE"))?;
    if name.is_empty() {
        return Err(format!("Invalid parameter '{s}'. Name is empty"));
    }

    let value = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(Value::from_json)
        .unwrap_or_else(|| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

fn parse_parameter_object(json: &str) -> Result<Parameters> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| StencilError::validation(format!("--params must be a JSON object: {e}")))?;

    object
        .into_iter()
        .map(|(name, value)| match Value::from_json(value) {
            Some(value) => Ok((name, value)),
            None => Err(StencilError::validation(format!(
                "Parameter '{name}' must be a string, number, boolean or null"
            ))),
        })
        .collect()
}

fn parse_json(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| StencilError::validation(format!("Invalid JSON: {e}")))
}

fn read_body(body: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    match (body, file) {
        (Some(body), _) => Ok(Some(body.to_string())),
        (None, Some(path)) => std::fs::read_to_string(path).map(Some).map_err(|e| {
            StencilError::validation(format!("Cannot read {}: {e}", path.display()))
        }),
        (None, None) => Ok(None),
    }
}
