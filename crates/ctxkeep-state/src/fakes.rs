//! In-memory fake for the snapshot store (testing only)
//!
//! `MemorySnapshotStore` satisfies the `SnapshotStore` contract without any
//! external dependencies. A single mutex makes every update atomic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::snapshot::{PropagationMetadata, Snapshot, SnapshotId};
use crate::storage_traits::*;
use crate::tier::MemoryTier;

/// In-memory snapshot store backed by a `HashMap<id, Snapshot>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().unwrap().is_empty()
    }

    fn collect<F>(&self, keep: F) -> Vec<Snapshot>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let snapshots = self.snapshots.lock().unwrap();
        snapshots.values().filter(|s| keep(s)).cloned().collect()
    }
}

fn newest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

fn oldest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0) as i64)
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> StorageResult<SnapshotId> {
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.insert(snapshot.id().as_str().to_string(), snapshot.clone());
        Ok(snapshot.id().clone())
    }

    async fn get(&self, id: &SnapshotId) -> StorageResult<Option<Snapshot>> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots.get(id.as_str()).cloned())
    }

    async fn find_by_project_page(
        &self,
        project: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let mut found = self.collect(|s| s.project() == project);
        newest_first(&mut found);
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_recent(
        &self,
        project: &str,
        before: DateTime<Utc>,
        hours_back: f64,
    ) -> StorageResult<Vec<Snapshot>> {
        let since = before - hours(hours_back);
        let mut found = self.collect(|s| {
            s.project() == project && s.created_at() >= since && s.created_at() <= before
        });
        newest_first(&mut found);
        Ok(found)
    }

    async fn search(&self, query: &str, project: Option<&str>) -> StorageResult<Vec<Snapshot>> {
        let mut found = self.collect(|s| {
            project.map(|p| s.project() == p).unwrap_or(true) && s.matches_query(query)
        });
        newest_first(&mut found);
        Ok(found)
    }

    async fn update_memory_tier(&self, id: &SnapshotId, tier: MemoryTier) -> StorageResult<bool> {
        let mut snapshots = self.snapshots.lock().unwrap();
        match snapshots.get_mut(id.as_str()) {
            Some(entry) => {
                *entry = entry.with_tier(tier);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_access_tracking(
        &self,
        id: &SnapshotId,
        accessed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>> {
        let mut snapshots = self.snapshots.lock().unwrap();
        match snapshots.get_mut(id.as_str()) {
            Some(entry) => {
                // The tier is left to the classifier; only the access fields change here.
                let tier = entry.memory_tier();
                *entry = entry.mark_accessed(accessed_at).with_tier(tier);
                Ok(Some(entry.clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let mut found = self.collect(|s| s.memory_tier() == tier);
        oldest_first(&mut found);
        found.truncate(limit);
        Ok(found)
    }

    async fn find_stalest_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let mut found = self.collect(|s| s.memory_tier() == tier);
        found.sort_by(|a, b| {
            a.reference_time()
                .cmp(&b.reference_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn update_propagation(
        &self,
        id: &SnapshotId,
        propagation: &PropagationMetadata,
    ) -> StorageResult<bool> {
        let mut snapshots = self.snapshots.lock().unwrap();
        match snapshots.get_mut(id.as_str()) {
            Some(entry) => {
                *entry = entry.with_propagation(propagation.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_prediction_score(
        &self,
        min_score: f64,
        project: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let mut found = self.collect(|s| {
            project.map(|p| s.project() == p).unwrap_or(true)
                && s.propagation().map(|p| p.score() >= min_score).unwrap_or(false)
        });
        found.sort_by(|a, b| {
            let sa = a.propagation().map(|p| p.score()).unwrap_or(0.0);
            let sb = b.propagation().map(|p| p.score()).unwrap_or(0.0);
            sb.total_cmp(&sa).then_with(|| a.id().cmp(b.id()))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn find_stale_predictions(
        &self,
        hours_stale_threshold: f64,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let now = Utc::now();
        let mut found = self.collect(|s| s.is_prediction_stale(hours_stale_threshold, now));
        oldest_first(&mut found);
        found.truncate(limit);
        Ok(found)
    }

    async fn delete(&self, id: &SnapshotId) -> StorageResult<bool> {
        let mut snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots.remove(id.as_str()).is_some())
    }
}
