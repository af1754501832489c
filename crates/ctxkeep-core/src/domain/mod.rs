//! Domain models for ctxkeep.
//!
//! The snapshot entity and its value types live in `ctxkeep-state`; they are
//! re-exported here together with the domain error type.

pub mod error;

pub use ctxkeep_state::{
    CausalityMetadata, MemoryTier, PredictionReason, PropagationMetadata, Snapshot,
    SnapshotBuilder, SnapshotId,
};
pub use error::{KeeperError, Result};
