//! ctxkeep-state: Snapshot entity and persistence for ctxkeep
//!
//! This crate owns the data every analytical layer works on: the immutable
//! [`Snapshot`] value, its causal and predictive metadata, and the
//! [`SnapshotStore`] port through which it is persisted.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: entity invariants and single-record atomic updates.
//!
//! ## Key Components
//!
//! - `Snapshot` / `SnapshotBuilder`: validated, copy-on-write entity
//! - `MemoryTier`: temporal relevance classification
//! - `SnapshotStore`: async storage port
//! - `MemorySnapshotStore`: in-memory fake for tests
//! - `SurrealSnapshotStore`: SurrealDB backend

pub mod connection;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod snapshot;
pub mod storage_traits;
pub mod surreal_store;
pub mod tier;

pub use connection::RemoteConfig;
pub use error::{StorageError, ValidationError};
pub use fakes::MemorySnapshotStore;
pub use schema::SnapshotRow;
pub use snapshot::{
    clamp_unit, CausalityMetadata, PredictionReason, PropagationMetadata, Snapshot,
    SnapshotBuilder, SnapshotId, SnapshotParts,
};
pub use storage_traits::{SnapshotStore, StorageResult};
pub use surreal_store::SurrealSnapshotStore;
pub use tier::{elapsed_hours, MemoryTier};
