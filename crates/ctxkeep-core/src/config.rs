//! Tunables for the three analytical layers.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only
//! needs to mention the values it changes.

use serde::{Deserialize, Serialize};

/// Causal tracking limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalityConfig {
    /// How far back dependency detection looks, in hours.
    pub lookback_hours: f64,
    /// Maximum number of auto-detected dependencies.
    pub max_dependencies: usize,
    /// How many chains `get_causality_stats` builds to estimate the average length.
    pub chain_sample_size: usize,
    /// Page size used when statistics walk a whole project.
    pub stats_page_size: usize,
}

impl Default for CausalityConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 1.0,
            max_dependencies: 5,
            chain_sample_size: 10,
            stats_page_size: 500,
        }
    }
}

/// Memory-tier sweep limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Maximum snapshots examined per tier recalculation.
    pub batch_limit: usize,
    /// Default number of expired snapshots deleted per pruning call.
    pub prune_limit: usize,
    /// Page size used when statistics walk a whole project.
    pub stats_page_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            batch_limit: 1000,
            prune_limit: 100,
            stats_page_size: 500,
        }
    }
}

/// Prediction refresh and candidate selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Age in hours after which a cached prediction is recomputed.
    pub stale_threshold_hours: f64,
    /// Maximum predictions recomputed per sweep.
    pub batch_limit: usize,
    /// Minimum score for a high-value candidate.
    pub min_score: f64,
    /// Maximum high-value candidates returned.
    pub high_value_limit: usize,
    /// Page size used when statistics walk a whole project.
    pub stats_page_size: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            stale_threshold_hours: 24.0,
            batch_limit: 100,
            min_score: 0.6,
            high_value_limit: 10,
            stats_page_size: 500,
        }
    }
}

/// Top-level configuration for a [`crate::ContextKeeper`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub causality: CausalityConfig,
    pub memory: ClassifierConfig,
    pub propagation: PropagationConfig,
    /// Attach high-value candidates to load results.
    pub prefetch_predictions: bool,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            causality: CausalityConfig::default(),
            memory: ClassifierConfig::default(),
            propagation: PropagationConfig::default(),
            prefetch_predictions: true,
        }
    }
}
