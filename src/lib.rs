//! Stencil - named, parameterized SQL templates with an audit trail.
//!
//! The library exposes the execution engine, stores and database adapters for
//! the `stencil` binary and for integration tests.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod query;
