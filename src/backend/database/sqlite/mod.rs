//! SQLite backend
//!
//! Single-file or in-memory databases through the sqlx SQLite driver.

pub mod backend_impl;

pub use backend_impl::{SqliteDialect, SqliteExecutor, SqliteStore};
