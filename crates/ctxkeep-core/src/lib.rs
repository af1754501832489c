//! ctxkeep Core Library
//!
//! Causal provenance, memory tiers and access prediction over preserved
//! agent context. Every service depends only on the
//! [`SnapshotStore`](ctxkeep_state::SnapshotStore) port.
//!
//! - Layer 1, [`causality`]: why a snapshot exists, causal chains.
//! - Layer 2, [`memory`]: temporal tiers, access tracking, pruning.
//! - Layer 3, [`propagation`]: predicted next access and high-value candidates.
//!
//! [`ContextKeeper`] ties the layers together for callers.

pub mod causality;
pub mod config;
pub mod domain;
pub mod keeper;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod propagation;
mod scan;
pub mod telemetry;

pub use causality::{
    ActionRecord, CausalChain, CausalityStats, CausalityTracker, ChainLink, ChainTermination,
};
pub use config::{CausalityConfig, ClassifierConfig, KeeperConfig, PropagationConfig};
pub use domain::{
    CausalityMetadata, KeeperError, MemoryTier, PredictionReason, PropagationMetadata, Result,
    Snapshot, SnapshotBuilder, SnapshotId,
};
pub use keeper::{ContextKeeper, LoadRequest, LoadResult, MaintenanceReport, SaveRequest};
pub use memory::{MemoryClassifier, MemoryStats};
pub use propagation::{PropagationScorer, PropagationStats};

pub use ctxkeep_state::{MemorySnapshotStore, SnapshotStore, SurrealSnapshotStore};

/// ctxkeep version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
