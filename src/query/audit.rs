//! Writes execution log entries without letting failures reach the caller.

use crate::error::{StencilError, Result};
use crate::persistence::{AuditStore, ExecutionLog, NewExecutionLog};
use tracing::{debug, warn};

/// Records one log entry per execution attempt.
pub struct AuditRecorder<'a> {
    store: &'a dyn AuditStore,
}

impl<'a> AuditRecorder<'a> {
    pub fn new(store: &'a dyn AuditStore) -> Self {
        Self { store }
    }

    /// Appends the entry, reporting failure as `StencilError::AuditWrite`.
    pub async fn record(&self, entry: &NewExecutionLog) -> Result<ExecutionLog> {
        self.store
            .append(entry)
            .await
            .map_err(|e| StencilError::audit_write(e.detail().to_string()))
    }

    /// Appends the entry; a failure is logged and swallowed.
    pub async fn record_best_effort(&self, entry: &NewExecutionLog) -> Option<ExecutionLog> {
        match self.record(entry).await {
            Ok(log) => {
                debug!(log_id = %log.id, status = log.status.as_str(), "Execution logged");
                Some(log)
            }
            Err(e) => {
                warn!(
                    query_id = entry.query_id.as_deref().unwrap_or("-"),
                    status = entry.status.as_str(),
                    "{e}"
                );
                None
            }
        }
    }
}
