//! Template execution.
//!
//! Resolves a template, binds the caller's parameters, runs the statement,
//! normalizes the response and writes one execution log entry. The log entry
//! is written only after the outcome is known, and its failure never changes
//! that outcome.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::audit::AuditRecorder;
use super::binder;
use super::normalizer::{normalize, NormalizedResult};
use crate::db::{DatabaseClient, Parameters, Row};
use crate::error::{StencilError, Result};
use crate::persistence::{AuditStore, NewExecutionLog, QueryTemplate, TemplateStore, ANONYMOUS};

/// The result of a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub rows: Vec<Row>,
    pub query_name: String,
    pub execution_time_ms: u64,
    pub rows_affected: u64,
}

/// Runs stored templates against one database.
pub struct QueryExecutor<'a> {
    templates: &'a dyn TemplateStore,
    db: &'a dyn DatabaseClient,
    audit: AuditRecorder<'a>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        templates: &'a dyn TemplateStore,
        db: &'a dyn DatabaseClient,
        audit: &'a dyn AuditStore,
    ) -> Self {
        Self {
            templates,
            db,
            audit: AuditRecorder::new(audit),
        }
    }

    /// Executes the active template matching `identifier` (id or name).
    ///
    /// Returns `NotFound` without logging when nothing matches. Any later
    /// failure is logged and returned as `StencilError::Execution` carrying
    /// the underlying message and the elapsed time.
    pub async fn execute(
        &self,
        identifier: &str,
        parameters: &Parameters,
        caller: Option<&str>,
    ) -> Result<ExecutionOutcome> {
        let start = Instant::now();
        let executed_by = caller
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(ANONYMOUS);

        let template = self
            .templates
            .find_active(identifier)
            .await?
            .ok_or_else(|| StencilError::not_found(identifier))?;

        let result = self.run(&template, parameters).await;
        let execution_time_ms = elapsed_ms(start);

        match result {
            Ok(normalized) => {
                info!(
                    query = %template.name,
                    rows = normalized.row_count,
                    elapsed_ms = execution_time_ms,
                    "Query executed"
                );
                self.audit
                    .record_best_effort(&NewExecutionLog::success(
                        &template.id,
                        executed_by,
                        parameters,
                        execution_time_ms,
                        normalized.row_count,
                    ))
                    .await;

                Ok(ExecutionOutcome {
                    rows: normalized.rows,
                    query_name: template.name,
                    execution_time_ms,
                    rows_affected: normalized.row_count,
                })
            }
            Err(e) => {
                warn!(
                    query = %template.name,
                    elapsed_ms = execution_time_ms,
                    "Query failed: {}",
                    e.detail()
                );
                self.audit
                    .record_best_effort(&NewExecutionLog::failure(
                        &template.id,
                        executed_by,
                        parameters,
                        execution_time_ms,
                        e.detail(),
                    ))
                    .await;

                Err(StencilError::Execution {
                    message: e.detail().to_string(),
                    execution_time_ms,
                })
            }
        }
    }

    async fn run(
        &self,
        template: &QueryTemplate,
        parameters: &Parameters,
    ) -> Result<NormalizedResult> {
        let statement = binder::bind(&template.body, parameters, self.db.backend())?;
        debug!(
            query = %template.name,
            params = statement.params.len(),
            "Bound statement"
        );
        let response = self.db.execute(&statement).await?;
        Ok(normalize(response))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
