//! End-to-end tests for the save/load orchestration and maintenance cycle.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use ctxkeep_core::{
    ActionRecord, ContextKeeper, KeeperConfig, KeeperError, LoadRequest, MemorySnapshotStore,
    MemoryTier, PropagationMetadata, SaveRequest, Snapshot, SnapshotId, SnapshotStore,
};
use ctxkeep_state::{StorageError, StorageResult};

/// Delegates to an in-memory store but fails every access-tracking update.
#[derive(Default)]
struct FlakyAccessStore {
    inner: MemorySnapshotStore,
}

#[async_trait]
impl SnapshotStore for FlakyAccessStore {
    async fn save(&self, snapshot: &Snapshot) -> StorageResult<SnapshotId> {
        self.inner.save(snapshot).await
    }

    async fn get(&self, id: &SnapshotId) -> StorageResult<Option<Snapshot>> {
        self.inner.get(id).await
    }

    async fn find_by_project_page(
        &self,
        project: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        self.inner.find_by_project_page(project, offset, limit).await
    }

    async fn find_recent(
        &self,
        project: &str,
        before: DateTime<Utc>,
        hours_back: f64,
    ) -> StorageResult<Vec<Snapshot>> {
        self.inner.find_recent(project, before, hours_back).await
    }

    async fn search(&self, query: &str, project: Option<&str>) -> StorageResult<Vec<Snapshot>> {
        self.inner.search(query, project).await
    }

    async fn update_memory_tier(&self, id: &SnapshotId, tier: MemoryTier) -> StorageResult<bool> {
        self.inner.update_memory_tier(id, tier).await
    }

    async fn update_access_tracking(
        &self,
        _id: &SnapshotId,
        _accessed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>> {
        Err(StorageError::Connection("store unreachable".into()))
    }

    async fn find_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        self.inner.find_by_memory_tier(tier, limit).await
    }

    async fn find_stalest_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        self.inner.find_stalest_by_memory_tier(tier, limit).await
    }

    async fn update_propagation(
        &self,
        id: &SnapshotId,
        propagation: &PropagationMetadata,
    ) -> StorageResult<bool> {
        self.inner.update_propagation(id, propagation).await
    }

    async fn find_by_prediction_score(
        &self,
        min_score: f64,
        project: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        self.inner
            .find_by_prediction_score(min_score, project, limit)
            .await
    }

    async fn find_stale_predictions(
        &self,
        hours_stale_threshold: f64,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        self.inner
            .find_stale_predictions(hours_stale_threshold, limit)
            .await
    }

    async fn delete(&self, id: &SnapshotId) -> StorageResult<bool> {
        self.inner.delete(id).await
    }
}

/// Poll until the stored access count reaches `expected` or give up.
async fn wait_for_access_count(store: &dyn SnapshotStore, id: &SnapshotId, expected: u64) -> u64 {
    let mut seen = 0;
    for _ in 0..100 {
        seen = store
            .get(id)
            .await
            .unwrap()
            .map(|s| s.access_count())
            .unwrap_or(0);
        if seen >= expected {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    seen
}

fn keeper() -> (Arc<MemorySnapshotStore>, ContextKeeper) {
    let store = Arc::new(MemorySnapshotStore::new());
    let keeper = ContextKeeper::with_default_config(store.clone());
    (store, keeper)
}

#[tokio::test]
async fn save_records_causality_against_earlier_work() {
    let (_store, keeper) = keeper();

    let first = keeper
        .save_with_causality(
            SaveRequest::new("proj", "designed the schema")
                .tag("db")
                .action(ActionRecord::new("decision", "need persistence")),
        )
        .await
        .unwrap();
    assert!(first.causality().unwrap().dependencies.is_empty());

    let second = keeper
        .save_with_causality(
            SaveRequest::new("proj", "wrote migrations").action(
                ActionRecord::new("edit", "schema needs tables").caused_by(first.id().clone()),
            ),
        )
        .await
        .unwrap();
    let causality = second.causality().unwrap();
    assert_eq!(causality.dependencies, vec![first.id().clone()]);
    assert_eq!(causality.caused_by.as_ref(), Some(first.id()));

    let reasoning = keeper.reconstruct_reasoning(second.id()).await.unwrap();
    assert!(reasoning.contains("designed the schema"));

    let chain = keeper.build_causal_chain(second.id()).await.unwrap();
    assert_eq!(chain.ids(), vec![first.id().clone(), second.id().clone()]);
    assert!(keeper.validate_causal_chain(second.id()).await.unwrap());
}

#[tokio::test]
async fn save_without_action_has_no_causality() {
    let (store, keeper) = keeper();
    let s = keeper
        .save_with_causality(SaveRequest::new("proj", "plain").source("cli"))
        .await
        .unwrap();
    assert!(s.causality().is_none());
    assert_eq!(store.get(s.id()).await.unwrap().unwrap().source(), Some("cli"));
}

#[tokio::test]
async fn blank_summary_is_rejected_before_persisting() {
    let (store, keeper) = keeper();
    let err = keeper
        .save_with_causality(SaveRequest::new("proj", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::Validation(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn load_tracks_access_in_the_background() {
    let (store, keeper) = keeper();
    let saved = keeper
        .save_with_causality(SaveRequest::new("proj", "tokenizer fix").tag("lexer"))
        .await
        .unwrap();

    let result = keeper
        .load_with_access_tracking(LoadRequest::project("proj"))
        .await
        .unwrap();
    assert_eq!(result.snapshots.len(), 1);
    assert_eq!(result.snapshots[0].access_count(), 0);

    assert_eq!(wait_for_access_count(store.as_ref(), saved.id(), 1).await, 1);
}

#[tokio::test]
async fn search_load_respects_query_and_limit() {
    let (_store, keeper) = keeper();
    for summary in ["parser: tokens", "parser: ast", "docs"] {
        keeper
            .save_with_causality(SaveRequest::new("proj", summary))
            .await
            .unwrap();
    }

    let result = keeper
        .load_with_access_tracking(LoadRequest::search("PARSER").in_project("proj").limit(1))
        .await
        .unwrap();
    assert_eq!(result.snapshots.len(), 1);
    assert!(result.snapshots[0].summary().starts_with("parser"));
}

#[tokio::test]
async fn load_attaches_high_value_predictions_not_already_returned() {
    let (store, keeper) = keeper();
    let hot = keeper
        .save_with_causality(SaveRequest::new("proj", "hot path"))
        .await
        .unwrap();
    let listed = keeper
        .save_with_causality(SaveRequest::new("proj", "matches query"))
        .await
        .unwrap();
    let now = Utc::now();
    for id in [hot.id(), listed.id()] {
        store
            .update_propagation(id, &PropagationMetadata::new(0.9, now, None, vec![]))
            .await
            .unwrap();
    }

    let result = keeper
        .load_with_access_tracking(LoadRequest::search("matches").in_project("proj"))
        .await
        .unwrap();
    assert_eq!(result.snapshots.len(), 1);
    assert_eq!(result.predicted.len(), 1);
    assert_eq!(result.predicted[0].id(), hot.id());
}

#[tokio::test]
async fn prefetch_can_be_disabled() {
    let store = Arc::new(MemorySnapshotStore::new());
    let config = KeeperConfig {
        prefetch_predictions: false,
        ..Default::default()
    };
    let keeper = ContextKeeper::new(store.clone(), config);
    let s = keeper
        .save_with_causality(SaveRequest::new("proj", "x"))
        .await
        .unwrap();
    store
        .update_propagation(s.id(), &PropagationMetadata::new(1.0, Utc::now(), None, vec![]))
        .await
        .unwrap();

    let result = keeper
        .load_with_access_tracking(LoadRequest::search("nothing matches").in_project("proj"))
        .await
        .unwrap();
    assert!(result.snapshots.is_empty());
    assert!(result.predicted.is_empty());
}

#[tokio::test]
async fn access_tracking_failures_never_reach_the_reader() {
    let store = Arc::new(FlakyAccessStore::default());
    let keeper = ContextKeeper::with_default_config(store.clone());
    let s = keeper
        .save_with_causality(SaveRequest::new("proj", "readable"))
        .await
        .unwrap();

    let fetched = keeper.get(s.id()).await.unwrap();
    assert_eq!(fetched.id(), s.id());

    let loaded = keeper
        .load_with_access_tracking(LoadRequest::project("proj"))
        .await
        .unwrap();
    assert_eq!(loaded.snapshots.len(), 1);

    let handle = keeper.memory().spawn_track_access(s.id().clone());
    handle.await.unwrap();
    assert_eq!(store.get(s.id()).await.unwrap().unwrap().access_count(), 0);
}

#[tokio::test]
async fn get_unknown_is_not_found() {
    let (_store, keeper) = keeper();
    let err = keeper.get(&SnapshotId::from("missing")).await.unwrap_err();
    assert!(matches!(err, KeeperError::NotFound { .. }));
}

#[tokio::test]
async fn maintenance_cycle_recalculates_prunes_and_predicts() {
    let (store, keeper) = keeper();
    let now = Utc::now();
    let expired = Snapshot::builder("proj", "ancient")
        .build_at(now - Duration::days(40))
        .unwrap();
    let recent = Snapshot::builder("proj", "this morning")
        .build_at(now - Duration::hours(3))
        .unwrap();
    store.save(&expired).await.unwrap();
    store.save(&recent).await.unwrap();

    let report = keeper
        .run_maintenance(&["proj".to_string()], true)
        .await
        .unwrap();
    assert_eq!(report.tiers_changed, 2);
    assert_eq!(report.pruned, 1);
    assert_eq!(report.predictions_updated.get("proj"), Some(&1));
    assert_eq!(report.total_predictions_updated(), 1);

    assert!(store.get(expired.id()).await.unwrap().is_none());
    let kept = store.get(recent.id()).await.unwrap().unwrap();
    assert_eq!(kept.memory_tier(), MemoryTier::Recent);
    assert!(kept.propagation().is_some());

    let memory = keeper.get_memory_stats("proj").await.unwrap();
    assert_eq!(memory.total, 1);
    assert_eq!(memory.recent, 1);

    let propagation = keeper.get_propagation_stats("proj").await.unwrap();
    assert_eq!(propagation.with_predictions, 1);
    assert_eq!(propagation.stale_predictions, 0);
}

#[tokio::test]
async fn maintenance_without_pruning_keeps_expired() {
    let (store, keeper) = keeper();
    let expired = Snapshot::builder("proj", "ancient")
        .build_at(Utc::now() - Duration::days(40))
        .unwrap();
    store.save(&expired).await.unwrap();

    let report = keeper.run_maintenance(&[], false).await.unwrap();
    assert_eq!(report.pruned, 0);
    assert!(report.predictions_updated.is_empty());
    assert_eq!(
        store.get(expired.id()).await.unwrap().unwrap().memory_tier(),
        MemoryTier::Expired
    );
}
