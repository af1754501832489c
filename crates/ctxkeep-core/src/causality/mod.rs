//! Causal provenance: dependency detection and causal chains.

pub mod chain;
pub mod tracker;

pub use chain::{CausalChain, ChainLink, ChainTermination};
pub use tracker::{ActionRecord, CausalityStats, CausalityTracker};
