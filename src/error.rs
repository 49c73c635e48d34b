//! Error types for Stencil.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for Stencil operations.
#[derive(Error, Debug)]
pub enum StencilError {
    /// No active template matches the identifier.
    #[error("Query not found: {0}")]
    NotFound(String),

    /// A template with this name already exists.
    #[error("A query with this name already exists: {0}")]
    DuplicateName(String),

    /// Invalid input to a store operation (blank name, missing body, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The template and parameters could not be turned into a statement.
    #[error("Binding error: {0}")]
    Binding(String),

    /// The backend rejected or failed the statement (syntax errors, constraint
    /// violations, lost connections, timeouts).
    #[error("Backend error: {0}")]
    Backend(String),

    /// A template execution failed after the template was resolved.
    ///
    /// Carries the underlying failure's message verbatim.
    #[error("{message}")]
    Execution {
        message: String,
        execution_time_ms: u64,
    },

    /// Writing an execution log entry failed. Never surfaced in place of an
    /// execution outcome.
    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// State database errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StencilError {
    /// Creates a not-found error for the given identifier.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound(identifier.into())
    }

    /// Creates a duplicate-name error for the given template name.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a binding error with the given message.
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates an audit write error with the given message.
    pub fn audit_write(msg: impl Into<String>) -> Self {
        Self::AuditWrite(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not Found",
            Self::DuplicateName(_) => "Duplicate Name",
            Self::Validation(_) => "Validation Error",
            Self::Binding(_) => "Binding Error",
            Self::Backend(_) => "Backend Error",
            Self::Execution { .. } => "Execution Error",
            Self::AuditWrite(_) => "Audit Error",
            Self::Connection(_) => "Connection Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    ///
    /// Backend messages pass through unchanged, so this is what execution logs
    /// and callers see.
    pub fn detail(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::DuplicateName(msg)
            | Self::Validation(msg)
            | Self::Binding(msg)
            | Self::Backend(msg)
            | Self::AuditWrite(msg)
            | Self::Connection(msg)
            | Self::Persistence(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg,
            Self::Execution { message, .. } => message,
        }
    }

    /// Returns the measured execution time, if the failure happened after the
    /// timer started.
    pub fn execution_time_ms(&self) -> Option<u64> {
        match self {
            Self::Execution {
                execution_time_ms, ..
            } => Some(*execution_time_ms),
            _ => None,
        }
    }
}

/// Result type alias using StencilError.
pub type Result<T> = std::result::Result<T, StencilError>;
