//! The template execution engine.
//!
//! Binding, result normalization and audit recording are separate modules so
//! each can be tested without a database.

pub mod audit;
pub mod binder;
pub mod executor;
pub mod normalizer;

pub use audit::AuditRecorder;
pub use binder::{bind, placeholders};
pub use executor::{ExecutionOutcome, QueryExecutor};
pub use normalizer::{normalize, NormalizedResult};
