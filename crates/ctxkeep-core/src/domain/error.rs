//! Domain-level error taxonomy for ctxkeep.

use ctxkeep_state::{SnapshotId, StorageError, ValidationError};

/// ctxkeep domain errors.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("invalid snapshot: {0}")]
    Validation(#[from] ValidationError),

    #[error("snapshot not found: {id}")]
    NotFound { id: SnapshotId },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl KeeperError {
    pub fn not_found(id: &SnapshotId) -> Self {
        KeeperError::NotFound { id: id.clone() }
    }
}

/// Result type for ctxkeep domain operations.
pub type Result<T> = std::result::Result<T, KeeperError>;
