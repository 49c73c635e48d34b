//! Folds backend-specific response shapes into one result shape.

use crate::db::{BackendResponse, Row};
use serde::Serialize;

/// The uniform result of a statement: rows plus a row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub rows: Vec<Row>,
    pub row_count: u64,
}

/// Normalizes a backend response.
///
/// A reported affected-row count wins over the row array length. For
/// multi-result-set responses only the first set is kept.
pub fn normalize(response: BackendResponse) -> NormalizedResult {
    match response {
        BackendResponse::Rows {
            rows,
            rows_affected,
        } => {
            let row_count = rows_affected.unwrap_or(rows.len() as u64);
            NormalizedResult { rows, row_count }
        }
        BackendResponse::ResultSets(sets) => {
            let rows = sets.into_iter().next().unwrap_or_default();
            NormalizedResult {
                row_count: rows.len() as u64,
                rows,
            }
        }
        BackendResponse::Plain(rows) => NormalizedResult {
            row_count: rows.len() as u64,
            rows,
        },
    }
}
