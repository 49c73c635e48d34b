//! Command dispatch for Stencil.
//!
//! Handlers take their collaborators through `CommandContext`, so they can be
//! exercised with in-memory stores and mock databases.

pub mod handlers;
pub mod output;

pub use handlers::{dispatch, CommandContext};
pub use output::CommandOutput;
