//! Layer 3: cached access predictions.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use ctxkeep_state::{PredictionReason, Snapshot, SnapshotStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::score::compute_prediction;
use crate::config::PropagationConfig;
use crate::domain::{KeeperError, Result};
use crate::metrics::METRICS;
use crate::{obs, scan};

/// Aggregate prediction statistics for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationStats {
    pub total: usize,
    pub with_predictions: usize,
    /// Snapshots with no prediction or one past the stale threshold.
    pub stale_predictions: usize,
    /// Mean score over snapshots that have a prediction.
    pub average_score: f64,
    /// Predictions at or above the configured `min_score`.
    pub high_value_count: usize,
    pub reason_counts: BTreeMap<PredictionReason, usize>,
}

/// Computes, caches and serves access predictions.
pub struct PropagationScorer {
    store: Arc<dyn SnapshotStore>,
    config: PropagationConfig,
}

impl PropagationScorer {
    pub fn new(store: Arc<dyn SnapshotStore>, config: PropagationConfig) -> Self {
        Self { store, config }
    }

    pub fn with_default_config(store: Arc<dyn SnapshotStore>) -> Self {
        Self::new(store, PropagationConfig::default())
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Recompute missing or stale predictions belonging to `project`.
    ///
    /// `None` arguments fall back to the configured threshold and batch
    /// limit. The batch is drawn from all projects and then filtered, so a
    /// sweep may update fewer than `batch_limit` snapshots while stale ones
    /// remain; repeated sweeps converge.
    #[instrument(skip(self))]
    pub async fn update_project_predictions(
        &self,
        project: &str,
        stale_threshold_hours: Option<f64>,
        batch_limit: Option<usize>,
    ) -> Result<usize> {
        let threshold = stale_threshold_hours.unwrap_or(self.config.stale_threshold_hours);
        let limit = batch_limit.unwrap_or(self.config.batch_limit);
        let now = Utc::now();

        let stale = self.store.find_stale_predictions(threshold, limit).await?;

        let mut updated = 0;
        for snapshot in stale.iter().filter(|s| s.project() == project) {
            let prediction = compute_prediction(snapshot, now);
            if self
                .store
                .update_propagation(snapshot.id(), &prediction)
                .await?
            {
                debug!(
                    snapshot_id = %snapshot.id(),
                    score = prediction.score(),
                    "prediction updated"
                );
                updated += 1;
            }
        }

        METRICS.add_predictions_updated(updated as u64);
        obs::emit_predictions_updated(project, updated);
        Ok(updated)
    }

    /// Snapshots of `project` most likely to be needed next, best first.
    pub async fn get_high_value_contexts(
        &self,
        project: &str,
        min_score: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<Snapshot>> {
        let min_score = min_score.unwrap_or(self.config.min_score);
        let limit = limit.unwrap_or(self.config.high_value_limit);
        Ok(self
            .store
            .find_by_prediction_score(min_score, Some(project), limit)
            .await?)
    }

    /// Return `snapshot` with a current prediction, recomputing and
    /// persisting it first if it is missing or stale.
    pub async fn refresh_if_stale(
        &self,
        snapshot: &Snapshot,
        stale_threshold_hours: Option<f64>,
    ) -> Result<Snapshot> {
        let threshold = stale_threshold_hours.unwrap_or(self.config.stale_threshold_hours);
        let now = Utc::now();
        if !snapshot.is_prediction_stale(threshold, now) {
            return Ok(snapshot.clone());
        }

        let prediction = compute_prediction(snapshot, now);
        if !self
            .store
            .update_propagation(snapshot.id(), &prediction)
            .await?
        {
            return Err(KeeperError::not_found(snapshot.id()));
        }
        METRICS.add_predictions_updated(1);
        Ok(snapshot.with_propagation(prediction))
    }

    /// Aggregate the cached predictions over every snapshot of a project.
    pub async fn get_propagation_stats(&self, project: &str) -> Result<PropagationStats> {
        let now = Utc::now();
        let threshold = self.config.stale_threshold_hours;
        let min_score = self.config.min_score;
        let mut stats = PropagationStats::default();
        let mut score_sum = 0.0;

        let total = scan::for_each_in_project(
            self.store.as_ref(),
            project,
            self.config.stats_page_size,
            |snapshot| {
                if snapshot.is_prediction_stale(threshold, now) {
                    stats.stale_predictions += 1;
                }
                let Some(prediction) = snapshot.propagation() else {
                    return;
                };
                stats.with_predictions += 1;
                score_sum += prediction.score();
                if prediction.score() >= min_score {
                    stats.high_value_count += 1;
                }
                for reason in prediction.reasons() {
                    *stats.reason_counts.entry(*reason).or_default() += 1;
                }
            },
        )
        .await?;
        stats.total = total;

        if stats.with_predictions > 0 {
            stats.average_score = score_sum / stats.with_predictions as f64;
        }
        Ok(stats)
    }
}
