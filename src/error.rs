use crate::backend::BackendKind;
use thiserror::Error;

/// Coarse classification of a [`StoreError`].
///
/// Callers branch on this instead of matching error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    CapabilityNotSupported,
    BackendUnavailable,
    Configuration,
    Backend,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported type for field '{field}': {found}")]
    UnsupportedType { field: String, found: &'static str },

    #[error("No such field '{field}' in '{table}'")]
    NoSuchField { table: String, field: String },

    #[error("{backend} backend does not support {operation}")]
    CapabilityNotSupported {
        backend: BackendKind,
        operation: &'static str,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidArgument(_)
            | StoreError::UnsupportedType { .. }
            | StoreError::NoSuchField { .. }
            | StoreError::Serialization(_) => ErrorKind::InvalidArgument,
            StoreError::CapabilityNotSupported { .. } => ErrorKind::CapabilityNotSupported,
            StoreError::Configuration(_) => ErrorKind::Configuration,
            StoreError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            StoreError::Database(_) => ErrorKind::Backend,
        }
    }

    pub fn is_capability_not_supported(&self) -> bool {
        self.kind() == ErrorKind::CapabilityNotSupported
    }

    pub(crate) fn unsupported(backend: BackendKind, operation: &'static str) -> Self {
        StoreError::CapabilityNotSupported { backend, operation }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
