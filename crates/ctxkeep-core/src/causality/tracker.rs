//! Layer 1: why a snapshot exists and what it depends on.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctxkeep_state::{CausalityMetadata, Snapshot, SnapshotId, SnapshotStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::chain::{CausalChain, ChainTermination};
use crate::config::CausalityConfig;
use crate::domain::{KeeperError, Result};
use crate::{obs, scan};

/// The caller's account of the action that produced a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_type: String,
    pub rationale: String,
    pub caused_by: Option<SnapshotId>,
}

impl ActionRecord {
    pub fn new(action_type: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            rationale: rationale.into(),
            caused_by: None,
        }
    }

    pub fn caused_by(mut self, parent: SnapshotId) -> Self {
        self.caused_by = Some(parent);
        self
    }
}

/// Aggregate causal statistics for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalityStats {
    /// Snapshots carrying causality metadata.
    pub total_with_causality: usize,
    pub action_type_counts: BTreeMap<String, usize>,
    /// Snapshots with causality but no parent.
    pub root_causes: usize,
    /// Mean chain length over the sampled chains (0 when nothing was sampled).
    pub average_chain_length: f64,
    /// Number of chains the average was computed from.
    pub sampled_chains: usize,
}

/// Records causal metadata and reconstructs causal chains.
pub struct CausalityTracker {
    store: Arc<dyn SnapshotStore>,
    config: CausalityConfig,
}

impl CausalityTracker {
    pub fn new(store: Arc<dyn SnapshotStore>, config: CausalityConfig) -> Self {
        Self { store, config }
    }

    /// Create with default configuration
    pub fn with_default_config(store: Arc<dyn SnapshotStore>) -> Self {
        Self::new(store, CausalityConfig::default())
    }

    pub fn config(&self) -> &CausalityConfig {
        &self.config
    }

    /// Produce causality metadata for a snapshot about to be written.
    ///
    /// With a project, the most recent snapshots of that project created
    /// inside the lookback window become dependencies (newest first, capped
    /// at `max_dependencies`). Without one, detection is skipped.
    pub async fn record_action(
        &self,
        action: ActionRecord,
        project: Option<&str>,
    ) -> Result<CausalityMetadata> {
        self.record_action_at(action, project, Utc::now()).await
    }

    /// [`record_action`](Self::record_action) with an explicit clock.
    #[instrument(skip(self, action), fields(action_type = %action.action_type))]
    pub async fn record_action_at(
        &self,
        action: ActionRecord,
        project: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CausalityMetadata> {
        let dependencies = match project {
            Some(project) => self
                .store
                .find_recent(project, now, self.config.lookback_hours)
                .await?
                .into_iter()
                .take(self.config.max_dependencies)
                .map(|s| s.id().clone())
                .collect(),
            None => Vec::new(),
        };

        debug!(dependencies = dependencies.len(), "dependencies detected");

        Ok(CausalityMetadata {
            action_type: action.action_type,
            rationale: action.rationale,
            dependencies,
            caused_by: action.caused_by,
        })
    }

    async fn require(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| KeeperError::not_found(id))
    }

    /// Human-readable explanation of why a snapshot exists.
    pub async fn reconstruct_reasoning(&self, id: &SnapshotId) -> Result<String> {
        let snapshot = self.require(id).await?;

        let Some(causality) = snapshot.causality() else {
            return Ok(format!(
                "No recorded causality for this snapshot. It captures: {}",
                snapshot.summary()
            ));
        };

        let mut lines = vec![
            format!("Action: {}", causality.action_type),
            format!("Rationale: {}", causality.rationale),
        ];

        if let Some(parent_id) = &causality.caused_by {
            match self.store.get(parent_id).await? {
                Some(parent) => lines.push(format!("Caused by: {}", parent.summary())),
                None => lines.push(format!("Caused by: {} (no longer available)", parent_id)),
            }
        }

        lines.push(format!(
            "Built on {} related snapshot(s)",
            causality.dependencies.len()
        ));

        Ok(lines.join("\n"))
    }

    /// Follow `caused_by` pointers back from `id` to the root.
    ///
    /// A visited set guarantees termination; on a cycle the partial chain is
    /// returned with [`ChainTermination::Cycle`].
    pub async fn build_causal_chain(&self, id: &SnapshotId) -> Result<CausalChain> {
        let start = self.require(id).await?;

        let mut visited: HashSet<SnapshotId> = HashSet::new();
        visited.insert(start.id().clone());
        let mut walked = vec![start];

        let termination = loop {
            let parent_id = walked
                .last()
                .and_then(|s| s.causality())
                .and_then(|c| c.caused_by.clone());

            let Some(parent_id) = parent_id else {
                break ChainTermination::Root;
            };

            if !visited.insert(parent_id.clone()) {
                obs::emit_causal_cycle_detected(id.as_str(), parent_id.as_str(), walked.len());
                break ChainTermination::Cycle { at: parent_id };
            }

            match self.store.get(&parent_id).await? {
                Some(parent) => walked.push(parent),
                None => break ChainTermination::MissingParent { id: parent_id },
            }
        };

        Ok(CausalChain::from_backward_walk(walked, termination))
    }

    /// True only for a chain that reaches a root without a cycle or a
    /// dangling pointer, with creation times non-decreasing root to target.
    pub async fn validate_causal_chain(&self, id: &SnapshotId) -> Result<bool> {
        let chain = self.build_causal_chain(id).await?;
        Ok(chain.is_valid())
    }

    /// Causal statistics for a project.
    ///
    /// The counts cover every snapshot of the project. `average_chain_length`
    /// is estimated from the first `chain_sample_size` snapshots with
    /// causality, in store order (newest first). This is a bounded sample,
    /// biased toward recent work, not a full scan.
    #[instrument(skip(self))]
    pub async fn get_causality_stats(&self, project: &str) -> Result<CausalityStats> {
        let mut total_with_causality = 0;
        let mut root_causes = 0;
        let mut action_type_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut sample: Vec<SnapshotId> = Vec::new();
        let sample_size = self.config.chain_sample_size;

        scan::for_each_in_project(
            self.store.as_ref(),
            project,
            self.config.stats_page_size,
            |snapshot| {
                let Some(causality) = snapshot.causality() else {
                    return;
                };
                total_with_causality += 1;
                *action_type_counts
                    .entry(causality.action_type.clone())
                    .or_default() += 1;
                if causality.is_root() {
                    root_causes += 1;
                }
                if sample.len() < sample_size {
                    sample.push(snapshot.id().clone());
                }
            },
        )
        .await?;

        let mut total_length = 0;
        let mut sampled_chains = 0;
        for id in &sample {
            match self.build_causal_chain(id).await {
                Ok(chain) => {
                    total_length += chain.len();
                    sampled_chains += 1;
                }
                // Deleted between the scan and the walk.
                Err(KeeperError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        let average_chain_length = if sampled_chains == 0 {
            0.0
        } else {
            total_length as f64 / sampled_chains as f64
        };

        Ok(CausalityStats {
            total_with_causality,
            action_type_counts,
            root_causes,
            average_chain_length,
            sampled_chains,
        })
    }
}
