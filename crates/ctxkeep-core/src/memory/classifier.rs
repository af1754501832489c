//! Layer 2: temporal relevance of snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctxkeep_state::{MemoryTier, Snapshot, SnapshotId, SnapshotStore};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::config::ClassifierConfig;
use crate::domain::{KeeperError, Result};
use crate::metrics::METRICS;
use crate::{obs, scan};

/// Snapshot counts per persisted tier for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub active: usize,
    pub recent: usize,
    pub archived: usize,
    pub expired: usize,
}

impl MemoryStats {
    fn record(&mut self, tier: MemoryTier) {
        self.total += 1;
        match tier {
            MemoryTier::Active => self.active += 1,
            MemoryTier::Recent => self.recent += 1,
            MemoryTier::Archived => self.archived += 1,
            MemoryTier::Expired => self.expired += 1,
        }
    }

    pub fn count(&self, tier: MemoryTier) -> usize {
        match tier {
            MemoryTier::Active => self.active,
            MemoryTier::Recent => self.recent,
            MemoryTier::Archived => self.archived,
            MemoryTier::Expired => self.expired,
        }
    }
}

/// Classifies snapshots into memory tiers and keeps the persisted tiers current.
pub struct MemoryClassifier {
    store: Arc<dyn SnapshotStore>,
    config: ClassifierConfig,
}

impl MemoryClassifier {
    pub fn new(store: Arc<dyn SnapshotStore>, config: ClassifierConfig) -> Self {
        Self { store, config }
    }

    pub fn with_default_config(store: Arc<dyn SnapshotStore>) -> Self {
        Self::new(store, ClassifierConfig::default())
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Tier at the current wall-clock time.
    pub fn calculate_tier(
        created_at: DateTime<Utc>,
        last_accessed_at: Option<DateTime<Utc>>,
    ) -> MemoryTier {
        Self::calculate_tier_at(created_at, last_accessed_at, Utc::now())
    }

    /// Tier at `now`, measured from the last access or, failing that, creation.
    pub fn calculate_tier_at(
        created_at: DateTime<Utc>,
        last_accessed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> MemoryTier {
        MemoryTier::classify(last_accessed_at.unwrap_or(created_at), now)
    }

    /// Record an access now. See [`track_access_at`](Self::track_access_at).
    pub async fn track_access(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.track_access_at(id, Utc::now()).await
    }

    /// Record an access at `now` and return the updated snapshot.
    ///
    /// The count and timestamp are bumped by the store's atomic update; the
    /// tier is written back only when it changed.
    #[instrument(skip(self), fields(snapshot_id = %id))]
    pub async fn track_access_at(&self, id: &SnapshotId, now: DateTime<Utc>) -> Result<Snapshot> {
        let updated = self
            .store
            .update_access_tracking(id, now)
            .await?
            .ok_or_else(|| KeeperError::not_found(id))?;

        let tier = updated.tier_at(now);
        if tier != updated.memory_tier() && self.store.update_memory_tier(id, tier).await? {
            METRICS.add_tier_changes(1);
        }
        let updated = updated.with_tier(tier);

        METRICS.inc_accesses_tracked();
        obs::emit_access_tracked(id.as_str(), updated.access_count(), tier.as_str());
        Ok(updated)
    }

    /// Track an access on a detached task.
    ///
    /// The returned handle may be dropped. Errors never reach the caller;
    /// they are logged and counted.
    pub fn spawn_track_access(self: &Arc<Self>, id: SnapshotId) -> JoinHandle<()> {
        let classifier = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = classifier.track_access(&id).await {
                METRICS.inc_access_tracking_failures();
                obs::emit_access_tracking_failed(id.as_str(), &e);
            }
        })
    }

    /// Recompute tiers now. See [`recalculate_all_tiers_at`](Self::recalculate_all_tiers_at).
    pub async fn recalculate_all_tiers(&self, project: Option<&str>) -> Result<usize> {
        self.recalculate_all_tiers_at(project, Utc::now()).await
    }

    /// Recompute the tier of up to `batch_limit` snapshots and persist the
    /// ones that changed. Returns the number of changes.
    ///
    /// Without a project each tier gets an equal share of the budget (at
    /// least one snapshot), filled with its least recently referenced rows.
    /// Those are the rows due for demotion, so a tier full of live snapshots
    /// cannot starve the rest and repeated sweeps keep making progress.
    /// Budget a tier leaves unused passes to the next one.
    #[instrument(skip(self))]
    pub async fn recalculate_all_tiers_at(
        &self,
        project: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let batch = match project {
            Some(project) => {
                self.store
                    .find_by_project(project, self.config.batch_limit)
                    .await?
            }
            None => {
                let share = (self.config.batch_limit / MemoryTier::ALL.len()).max(1);
                let mut batch = Vec::new();
                let mut carried = 0;
                for tier in MemoryTier::ALL {
                    let budget = share + carried;
                    let rows = self.store.find_stalest_by_memory_tier(tier, budget).await?;
                    carried = budget.saturating_sub(rows.len());
                    batch.extend(rows);
                }
                batch
            }
        };

        let mut changed = 0;
        for snapshot in &batch {
            let tier = snapshot.tier_at(now);
            if tier == snapshot.memory_tier() {
                continue;
            }
            if self.store.update_memory_tier(snapshot.id(), tier).await? {
                debug!(
                    snapshot_id = %snapshot.id(),
                    from = %snapshot.memory_tier(),
                    to = %tier,
                    "tier changed"
                );
                changed += 1;
            }
        }

        METRICS.add_tier_changes(changed as u64);
        obs::emit_tiers_recalculated(project, batch.len(), changed);
        Ok(changed)
    }

    /// Prune using the configured default limit.
    pub async fn prune_expired(&self) -> Result<usize> {
        self.prune_expired_contexts(self.config.prune_limit).await
    }

    /// Delete up to `limit` expired snapshots, oldest first, and return how
    /// many were actually deleted.
    ///
    /// Candidates whose persisted tier lags behind (accessed since the last
    /// sweep) are re-checked and skipped.
    #[instrument(skip(self))]
    pub async fn prune_expired_contexts(&self, limit: usize) -> Result<usize> {
        let now = Utc::now();
        let candidates = self
            .store
            .find_by_memory_tier(MemoryTier::Expired, limit)
            .await?;

        let mut deleted = 0;
        for snapshot in &candidates {
            if snapshot.tier_at(now) != MemoryTier::Expired {
                continue;
            }
            if self.store.delete(snapshot.id()).await? {
                debug!(snapshot_id = %snapshot.id(), project = snapshot.project(), "pruned");
                deleted += 1;
            }
        }

        METRICS.add_snapshots_pruned(deleted as u64);
        obs::emit_prune_completed(candidates.len(), deleted);
        Ok(deleted)
    }

    /// Counts of persisted tiers over every snapshot of the project.
    pub async fn get_memory_stats(&self, project: &str) -> Result<MemoryStats> {
        let mut stats = MemoryStats::default();
        scan::for_each_in_project(
            self.store.as_ref(),
            project,
            self.config.stats_page_size,
            |snapshot| stats.record(snapshot.memory_tier()),
        )
        .await?;
        Ok(stats)
    }

    /// Snapshots in `tier` ordered by last access, never-accessed first.
    pub async fn find_least_recently_used(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        let mut snapshots = self
            .store
            .find_by_memory_tier(tier, self.config.batch_limit)
            .await?;

        // `None < Some(_)`, so never-accessed snapshots sort first.
        snapshots.sort_by(|a, b| {
            a.last_accessed_at()
                .cmp(&b.last_accessed_at())
                .then_with(|| a.created_at().cmp(&b.created_at()))
        });
        snapshots.truncate(limit);
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ctxkeep_state::MemorySnapshotStore;

    fn store() -> Arc<MemorySnapshotStore> {
        Arc::new(MemorySnapshotStore::new())
    }

    async fn saved(
        store: &MemorySnapshotStore,
        summary: &str,
        created_at: DateTime<Utc>,
    ) -> Snapshot {
        let s = Snapshot::builder("p", summary).build_at(created_at).unwrap();
        store.save(&s).await.unwrap();
        s
    }

    #[test]
    fn calculate_tier_prefers_last_access() {
        let now = Utc::now();
        let created = now - Duration::days(40);
        assert_eq!(
            MemoryClassifier::calculate_tier_at(created, None, now),
            MemoryTier::Expired
        );
        assert_eq!(
            MemoryClassifier::calculate_tier_at(created, Some(now - Duration::minutes(5)), now),
            MemoryTier::Active
        );
    }

    #[tokio::test]
    async fn access_resets_reference_time() {
        let store = store();
        let t0 = Utc::now() - Duration::hours(2);
        let s = saved(&store, "s", t0).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());

        let at = t0 + Duration::hours(2);
        assert_eq!(s.tier_at(at), MemoryTier::Recent);

        let updated = classifier.track_access_at(s.id(), at).await.unwrap();
        assert_eq!(updated.last_accessed_at(), Some(at));
        assert_eq!(updated.memory_tier(), MemoryTier::Active);
        assert_eq!(updated.access_count(), 1);
    }

    #[tokio::test]
    async fn tracked_tier_change_is_persisted() {
        let store = store();
        let s = saved(&store, "old", Utc::now() - Duration::hours(30)).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());

        // Persist the stale tier first.
        classifier.recalculate_all_tiers(Some("p")).await.unwrap();
        assert_eq!(
            store.get(s.id()).await.unwrap().unwrap().memory_tier(),
            MemoryTier::Archived
        );

        classifier.track_access(s.id()).await.unwrap();
        assert_eq!(
            store.get(s.id()).await.unwrap().unwrap().memory_tier(),
            MemoryTier::Active
        );
    }

    #[tokio::test]
    async fn track_access_unknown_id_is_not_found() {
        let classifier = MemoryClassifier::with_default_config(store());
        let err = classifier
            .track_access(&SnapshotId::from("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeeperError::NotFound { .. }));
    }

    #[tokio::test]
    async fn spawned_tracking_failure_is_swallowed() {
        let classifier = Arc::new(MemoryClassifier::with_default_config(store()));
        let handle = classifier.spawn_track_access(SnapshotId::from("missing"));
        // The task completes without panicking even though the id is unknown.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn recalculation_is_idempotent() {
        let store = store();
        let now = Utc::now();
        saved(&store, "fresh", now).await;
        saved(&store, "hours", now - Duration::hours(3)).await;
        saved(&store, "days", now - Duration::days(3)).await;
        saved(&store, "months", now - Duration::days(45)).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());

        assert_eq!(classifier.recalculate_all_tiers_at(Some("p"), now).await.unwrap(), 3);
        assert_eq!(classifier.recalculate_all_tiers_at(Some("p"), now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recalculation_without_project_walks_every_tier() {
        let store = store();
        let now = Utc::now();
        let s = Snapshot::builder("other", "x")
            .build_at(now - Duration::hours(5))
            .unwrap();
        store.save(&s).await.unwrap();
        saved(&store, "y", now - Duration::days(2)).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());

        assert_eq!(classifier.recalculate_all_tiers_at(None, now).await.unwrap(), 2);
        assert_eq!(classifier.recalculate_all_tiers_at(None, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bounded_sweep_reaches_stale_rows_behind_live_ones() {
        let store = store();
        let now = Utc::now();
        // Oldest by creation, but kept active by recent reads.
        for summary in ["live-1", "live-2"] {
            let s = saved(&store, summary, now - Duration::days(3)).await;
            store
                .update_access_tracking(s.id(), now - Duration::minutes(5))
                .await
                .unwrap();
        }
        let idle = saved(&store, "idle", now - Duration::hours(30)).await;
        let lapsed = saved(&store, "lapsed", now - Duration::days(40)).await;
        store
            .update_memory_tier(lapsed.id(), MemoryTier::Archived)
            .await
            .unwrap();

        let config = ClassifierConfig {
            batch_limit: 2,
            ..Default::default()
        };
        let classifier = MemoryClassifier::new(store.clone(), config);

        assert_eq!(classifier.recalculate_all_tiers_at(None, now).await.unwrap(), 2);
        assert_eq!(
            store.get(idle.id()).await.unwrap().unwrap().memory_tier(),
            MemoryTier::Archived
        );
        assert_eq!(
            store.get(lapsed.id()).await.unwrap().unwrap().memory_tier(),
            MemoryTier::Expired
        );
        assert_eq!(classifier.recalculate_all_tiers_at(None, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prune_really_deletes_expired_oldest_first() {
        let store = store();
        let now = Utc::now();
        let oldest = saved(&store, "oldest", now - Duration::days(90)).await;
        let older = saved(&store, "older", now - Duration::days(60)).await;
        let keep = saved(&store, "keep", now - Duration::days(2)).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());
        classifier.recalculate_all_tiers(Some("p")).await.unwrap();

        assert_eq!(classifier.prune_expired_contexts(1).await.unwrap(), 1);
        assert!(store.get(oldest.id()).await.unwrap().is_none());
        assert!(store.get(older.id()).await.unwrap().is_some());

        assert_eq!(classifier.prune_expired().await.unwrap(), 1);
        assert!(store.get(older.id()).await.unwrap().is_none());
        assert!(store.get(keep.id()).await.unwrap().is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn prune_skips_candidates_accessed_since_the_sweep() {
        let store = store();
        let s = saved(&store, "revived", Utc::now() - Duration::days(60)).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());
        classifier.recalculate_all_tiers(Some("p")).await.unwrap();

        // Access bumps the timestamp but leaves the persisted tier alone.
        store.update_access_tracking(s.id(), Utc::now()).await.unwrap();

        assert_eq!(classifier.prune_expired().await.unwrap(), 0);
        assert!(store.get(s.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stats_cover_projects_larger_than_one_page() {
        let store = store();
        let now = Utc::now();
        for i in 0..8 {
            saved(&store, &format!("s{i}"), now - Duration::minutes(i)).await;
        }
        let config = ClassifierConfig {
            stats_page_size: 3,
            ..Default::default()
        };
        let classifier = MemoryClassifier::new(store.clone(), config);

        let stats = classifier.get_memory_stats("p").await.unwrap();
        assert_eq!(stats.total, 8);
        assert_eq!(stats.active, 8);
    }

    #[tokio::test]
    async fn stats_count_persisted_tiers() {
        let store = store();
        let now = Utc::now();
        saved(&store, "a", now).await;
        saved(&store, "b", now - Duration::hours(2)).await;
        saved(&store, "c", now - Duration::days(2)).await;
        saved(&store, "d", now - Duration::days(31)).await;
        let classifier = MemoryClassifier::with_default_config(store.clone());
        classifier.recalculate_all_tiers_at(Some("p"), now).await.unwrap();

        let stats = classifier.get_memory_stats("p").await.unwrap();
        assert_eq!(
            stats,
            MemoryStats {
                total: 4,
                active: 1,
                recent: 1,
                archived: 1,
                expired: 1,
            }
        );
        assert_eq!(stats.count(MemoryTier::Expired), 1);
    }

    #[tokio::test]
    async fn least_recently_used_puts_never_accessed_first() {
        let store = store();
        let now = Utc::now();
        let a = saved(&store, "a", now - Duration::minutes(30)).await;
        let b = saved(&store, "b", now - Duration::minutes(20)).await;
        let never = saved(&store, "never", now - Duration::minutes(10)).await;
        store
            .update_access_tracking(a.id(), now - Duration::minutes(1))
            .await
            .unwrap();
        store
            .update_access_tracking(b.id(), now - Duration::minutes(5))
            .await
            .unwrap();
        let classifier = MemoryClassifier::with_default_config(store.clone());

        let lru = classifier
            .find_least_recently_used(MemoryTier::Active, 10)
            .await
            .unwrap();
        let ids: Vec<&SnapshotId> = lru.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![never.id(), b.id(), a.id()]);

        let limited = classifier
            .find_least_recently_used(MemoryTier::Active, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
