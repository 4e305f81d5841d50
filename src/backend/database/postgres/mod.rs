//! PostgreSQL backend

pub mod backend_impl;

pub use backend_impl::{PostgresDialect, PostgresExecutor, PostgresStore};
