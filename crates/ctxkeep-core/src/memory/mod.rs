//! Memory tiers: classification, access tracking, pruning.

pub mod classifier;

pub use classifier::{MemoryClassifier, MemoryStats};
