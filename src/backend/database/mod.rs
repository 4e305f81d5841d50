//! Relational storage layer
//!
//! This module provides one implementation of the record store contract for
//! every SQL backend (PostgreSQL, SQLite), with the database-specific pieces
//! kept behind a small executor trait.
//!
//! # Architecture
//!
//! ```text
//! RelationalAdapter (relational.rs)
//!     ├── schema.rs    (column types, table layouts)
//!     ├── filter.rs    (SQL translation)
//!     └── identity.rs  (id fabrication)
//!     ↓
//! Database-specific executors
//!     ├── postgres/ (PostgreSQL-specific code)
//!     └── sqlite/   (SQLite-specific code)
//! ```

pub mod filter;
pub mod identity;
pub mod postgres;
pub mod relational;
pub mod schema;
pub mod sqlite;

// Re-export key types for convenience
pub use filter::{SqlDialect, SqlTranslator};
pub use identity::IdGenerator;
pub use postgres::PostgresStore;
pub use relational::{RelationalAdapter, SqlExecutor};
pub use schema::{Column, ColumnType, Schema};
pub use sqlite::SqliteStore;
