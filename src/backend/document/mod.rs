//! Document storage backend (MongoDB)
//!
//! The store is schema-less: collections appear on first write, and filters,
//! sorting and upserts are handled natively by the server.

pub mod backend_impl;
pub mod convert;

pub use backend_impl::DocumentStore;
