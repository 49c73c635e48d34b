//! Command results as JSON documents.
//!
//! Every command prints exactly one JSON document to stdout. A failing
//! command also sets a non-zero exit code.

use crate::error::StencilError;
use serde::Serialize;
use serde_json::{json, Value};

/// Output from a command handler.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub body: Value,
    pub exit_code: i32,
}

impl CommandOutput {
    /// A successful result.
    pub fn success(body: Value) -> Self {
        Self { body, exit_code: 0 }
    }

    /// A failed result.
    pub fn failure(body: Value) -> Self {
        Self { body, exit_code: 1 }
    }

    /// `{ "data": ... }`
    pub fn data<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::success(json!({ "data": value })),
            Err(e) => Self::error_message(format!("Failed to encode response: {e}")),
        }
    }

    /// `{ "error": message }`
    pub fn error_message(message: impl Into<String>) -> Self {
        Self::failure(json!({ "error": message.into() }))
    }

    /// Renders an error as the message a caller sees.
    pub fn from_error(error: &StencilError) -> Self {
        match error {
            StencilError::NotFound(_) => Self::error_message("Query not found"),
            StencilError::DuplicateName(_) => {
                Self::error_message("A query with this name already exists")
            }
            other => Self::error_message(other.detail()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Renders the body as pretty-printed JSON.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.body.to_string())
    }
}
