pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod parser;

// Re-export commonly used types for easier access
pub use backend::{
    BackendConfig, BackendKind, Capabilities, DeleteResult, RecordStore, SelectOptions,
    UpdateResult,
};
pub use dispatcher::Dispatcher;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use models::{FieldValue, Record};
pub use parser::{Filter, SortOrder, SortSpec};
