//! Error types for ctxkeep-state

use thiserror::Error;

/// Snapshot construction rejected because an invariant does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty or whitespace only
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
}

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend query or write failed
    #[error("Storage backend failed: {0}")]
    Backend(String),

    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// A stored row could not be rehydrated into a valid snapshot
    #[error("Stored snapshot is invalid: {0}")]
    Validation(#[from] ValidationError),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
