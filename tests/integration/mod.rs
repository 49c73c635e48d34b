//! Integration tests for Stencil.

pub mod connection_test;
pub mod engine_test;
pub mod mysql_test;
pub mod persistence_test;
