//! Mock database clients for testing.
//!
//! `MockDatabaseClient` replays scripted responses and records every statement
//! it receives so tests can inspect exactly what would reach a backend.

use super::{BackendResponse, BoundStatement, DatabaseBackend, DatabaseClient, Row, Value};
use crate::error::{StencilError, Result};
use crate::query::binder::placeholders;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock database client that returns predefined results.
pub struct MockDatabaseClient {
    backend: DatabaseBackend,
    script: Mutex<VecDeque<Result<BackendResponse>>>,
    received: Mutex<Vec<BoundStatement>>,
}

impl MockDatabaseClient {
    /// Creates a mock that speaks the Postgres placeholder dialect.
    pub fn new() -> Self {
        Self::with_backend(DatabaseBackend::Postgres)
    }

    /// Creates a mock for the given backend family.
    pub fn with_backend(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            script: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response for the next statement.
    pub fn push_response(&self, response: BackendResponse) {
        self.lock_script().push_back(Ok(response));
    }

    /// Queues a backend failure for the next statement.
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock_script()
            .push_back(Err(StencilError::backend(message)));
    }

    /// Returns every statement executed so far, oldest first.
    pub fn statements(&self) -> Vec<BoundStatement> {
        match self.received.lock() {
            Ok(received) => received.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<BackendResponse>>> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn default_response(sql: &str) -> BackendResponse {
        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            BackendResponse::Rows {
                rows: vec![Row::new().with("result", Value::String(format!("Mock result for: {sql}")))],
                rows_affected: None,
            }
        } else {
            BackendResponse::Rows {
                rows: Vec::new(),
                rows_affected: Some(0),
            }
        }
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&self, statement: &BoundStatement) -> Result<BackendResponse> {
        match self.received.lock() {
            Ok(mut received) => received.push(statement.clone()),
            Err(poisoned) => poisoned.into_inner().push(statement.clone()),
        }

        // A real backend rejects leftover named placeholders.
        if let Some(name) = placeholders(&statement.sql).into_iter().next() {
            return Err(StencilError::backend(format!(
                "syntax error at or near \":{name}\""
            )));
        }

        match self.lock_script().pop_front() {
            Some(scripted) => scripted,
            None => Ok(Self::default_response(&statement.sql)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
