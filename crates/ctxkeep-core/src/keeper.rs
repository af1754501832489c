//! Orchestration surface over the three analytical layers.
//!
//! `ContextKeeper` owns one instance of each layer service, all sharing the
//! same store. The write path records causality before persisting; the read
//! path returns immediately and tracks access on detached tasks.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use ctxkeep_state::{Snapshot, SnapshotId, SnapshotStore};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::causality::{ActionRecord, CausalChain, CausalityStats, CausalityTracker};
use crate::config::KeeperConfig;
use crate::domain::{KeeperError, Result};
use crate::memory::{MemoryClassifier, MemoryStats};
use crate::metrics::METRICS;
use crate::obs;
use crate::propagation::{PropagationScorer, PropagationStats};

/// Default number of snapshots returned by a load.
pub const DEFAULT_LOAD_LIMIT: usize = 20;

/// A snapshot to persist, with the optional action that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub project: String,
    pub summary: String,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque caller payload, typically JSON.
    pub metadata: Option<String>,
    pub action: Option<ActionRecord>,
}

impl SaveRequest {
    pub fn new(project: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            summary: summary.into(),
            source: None,
            tags: Vec::new(),
            metadata: None,
            action: None,
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn action(mut self, action: ActionRecord) -> Self {
        self.action = Some(action);
        self
    }
}

/// What to load.
///
/// With a query, snapshots are searched (optionally within the project);
/// without one, the project's newest snapshots are listed. With neither,
/// every project is searched with an empty query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub project: Option<String>,
    pub query: Option<String>,
    pub limit: usize,
}

impl LoadRequest {
    pub fn project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            query: None,
            limit: DEFAULT_LOAD_LIMIT,
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self {
            project: None,
            query: Some(query.into()),
            limit: DEFAULT_LOAD_LIMIT,
        }
    }

    pub fn in_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Snapshots returned by a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    /// Primary matches, as they were before this load's access was recorded.
    pub snapshots: Vec<Snapshot>,
    /// High-value candidates from the same project not already in `snapshots`.
    pub predicted: Vec<Snapshot>,
}

/// Outcome of one maintenance cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub tiers_changed: usize,
    pub pruned: usize,
    /// Predictions refreshed, per project.
    pub predictions_updated: BTreeMap<String, usize>,
}

impl MaintenanceReport {
    pub fn total_predictions_updated(&self) -> usize {
        self.predictions_updated.values().sum()
    }
}

/// Entry point for saving and loading context.
pub struct ContextKeeper {
    store: Arc<dyn SnapshotStore>,
    causality: CausalityTracker,
    memory: Arc<MemoryClassifier>,
    propagation: PropagationScorer,
    prefetch_predictions: bool,
}

impl ContextKeeper {
    pub fn new(store: Arc<dyn SnapshotStore>, config: KeeperConfig) -> Self {
        Self {
            causality: CausalityTracker::new(Arc::clone(&store), config.causality),
            memory: Arc::new(MemoryClassifier::new(Arc::clone(&store), config.memory)),
            propagation: PropagationScorer::new(Arc::clone(&store), config.propagation),
            prefetch_predictions: config.prefetch_predictions,
            store,
        }
    }

    pub fn with_default_config(store: Arc<dyn SnapshotStore>) -> Self {
        Self::new(store, KeeperConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn causality(&self) -> &CausalityTracker {
        &self.causality
    }

    pub fn memory(&self) -> &Arc<MemoryClassifier> {
        &self.memory
    }

    pub fn propagation(&self) -> &PropagationScorer {
        &self.propagation
    }

    /// Persist a new snapshot, recording causality first when an action is given.
    ///
    /// Dependencies are detected before the write, so a snapshot never lists
    /// itself. Validation runs before anything is persisted.
    #[instrument(skip(self, request), fields(project = %request.project))]
    pub async fn save_with_causality(&self, request: SaveRequest) -> Result<Snapshot> {
        let causality = match request.action {
            Some(action) => Some(
                self.causality
                    .record_action(action, Some(&request.project))
                    .await?,
            ),
            None => None,
        };

        let mut builder = Snapshot::builder(request.project, request.summary).tags(request.tags);
        if let Some(source) = request.source {
            builder = builder.source(source);
        }
        if let Some(metadata) = request.metadata {
            builder = builder.metadata(metadata);
        }
        if let Some(causality) = causality {
            builder = builder.causality(causality);
        }
        let snapshot = builder.build()?;

        self.store.save(&snapshot).await?;

        let _span = obs::SnapshotSpan::enter(snapshot.id().as_str(), snapshot.project());
        METRICS.inc_snapshots_saved();
        let dependencies = snapshot
            .causality()
            .map(|c| c.dependencies.len())
            .unwrap_or(0);
        obs::emit_snapshot_saved(snapshot.id().as_str(), snapshot.project(), dependencies);
        Ok(snapshot)
    }

    /// Load snapshots and record an access for each, without waiting for it.
    #[instrument(skip(self))]
    pub async fn load_with_access_tracking(&self, request: LoadRequest) -> Result<LoadResult> {
        let mut snapshots = match (&request.query, &request.project) {
            (None, Some(project)) => self.store.find_by_project(project, request.limit).await?,
            (query, project) => {
                self.store
                    .search(query.as_deref().unwrap_or(""), project.as_deref())
                    .await?
            }
        };
        snapshots.truncate(request.limit);

        for snapshot in &snapshots {
            self.memory.spawn_track_access(snapshot.id().clone());
        }

        let predicted = match (&request.project, self.prefetch_predictions) {
            (Some(project), true) => {
                let seen: HashSet<&SnapshotId> = snapshots.iter().map(|s| s.id()).collect();
                self.propagation
                    .get_high_value_contexts(project, None, None)
                    .await?
                    .into_iter()
                    .filter(|s| !seen.contains(s.id()))
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(LoadResult {
            snapshots,
            predicted,
        })
    }

    /// Fetch one snapshot and record the access in the background.
    pub async fn get(&self, id: &SnapshotId) -> Result<Snapshot> {
        let snapshot = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| KeeperError::not_found(id))?;
        self.memory.spawn_track_access(id.clone());
        Ok(snapshot)
    }

    pub async fn reconstruct_reasoning(&self, id: &SnapshotId) -> Result<String> {
        self.causality.reconstruct_reasoning(id).await
    }

    pub async fn build_causal_chain(&self, id: &SnapshotId) -> Result<CausalChain> {
        self.causality.build_causal_chain(id).await
    }

    pub async fn validate_causal_chain(&self, id: &SnapshotId) -> Result<bool> {
        self.causality.validate_causal_chain(id).await
    }

    pub async fn get_causality_stats(&self, project: &str) -> Result<CausalityStats> {
        self.causality.get_causality_stats(project).await
    }

    pub async fn get_memory_stats(&self, project: &str) -> Result<MemoryStats> {
        self.memory.get_memory_stats(project).await
    }

    pub async fn recalculate_all_tiers(&self, project: Option<&str>) -> Result<usize> {
        self.memory.recalculate_all_tiers(project).await
    }

    pub async fn prune_expired_contexts(&self, limit: usize) -> Result<usize> {
        self.memory.prune_expired_contexts(limit).await
    }

    pub async fn update_project_predictions(&self, project: &str) -> Result<usize> {
        self.propagation
            .update_project_predictions(project, None, None)
            .await
    }

    pub async fn get_high_value_contexts(&self, project: &str) -> Result<Vec<Snapshot>> {
        self.propagation
            .get_high_value_contexts(project, None, None)
            .await
    }

    pub async fn get_propagation_stats(&self, project: &str) -> Result<PropagationStats> {
        self.propagation.get_propagation_stats(project).await
    }

    /// One bounded maintenance cycle: recalculate tiers across all projects,
    /// optionally prune expired snapshots, then refresh predictions for each
    /// listed project.
    #[instrument(skip(self))]
    pub async fn run_maintenance(
        &self,
        projects: &[String],
        prune: bool,
    ) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport {
            tiers_changed: self.memory.recalculate_all_tiers(None).await?,
            ..Default::default()
        };

        if prune {
            report.pruned = self.memory.prune_expired().await?;
        }

        for project in projects {
            let updated = self.update_project_predictions(project).await?;
            report.predictions_updated.insert(project.clone(), updated);
        }

        Ok(report)
    }
}
