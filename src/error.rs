//! Error types for the todo store.

use crate::types::TodoId;
use crate::validation::ValidationErrors;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for store, storage and gateway operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Todo not found: {0}")]
    NotFound(TodoId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Store has been disposed")]
    Disposed,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<ValidationErrors> for StoreError {
    fn from(e: ValidationErrors) -> Self {
        StoreError::Validation(e)
    }
}

/// The four error kinds surfaced to callers of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input failed its schema.
    Validation,
    /// Gateway or storage missing, locked, or torn down.
    BackendUnavailable,
    /// Backend call rejected.
    OperationFailed,
    /// Mutation referenced an unknown id.
    NotFound,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::BackendUnavailable(_) | StoreError::Locked | StoreError::Disposed => {
                ErrorKind::BackendUnavailable
            }
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Io(_)
            | StoreError::OperationFailed(_)
            | StoreError::Serialization(_)
            | StoreError::Deserialization(_)
            | StoreError::InvalidFormat(_)
            | StoreError::ChecksumMismatch { .. } => ErrorKind::OperationFailed,
        }
    }

    /// HTTP status for the server resource layer.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::BackendUnavailable => 503,
            ErrorKind::OperationFailed => 500,
        }
    }

    /// Field errors, if this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            StoreError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
