//! Storage port for snapshots.
//!
//! `SnapshotStore` is the only persistence abstraction the analytical layers
//! depend on. It is async and backend-agnostic; an in-memory fake is provided
//! in the `fakes` module and a SurrealDB backend in `surreal_store`.
//!
//! Concurrency contract: `update_access_tracking`, `update_memory_tier` and
//! `update_propagation` are single-record atomic updates. Two concurrent
//! access-tracking calls on the same id must both be counted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::snapshot::{PropagationMetadata, Snapshot, SnapshotId};
use crate::tier::MemoryTier;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Snapshot persistence port.
///
/// Ordering guarantees:
/// - `find_by_project(_page)`, `find_recent`, `search`: newest first by `created_at`.
/// - `find_by_memory_tier`, `find_stale_predictions`: oldest first by `created_at`.
/// - `find_stalest_by_memory_tier`: oldest reference time (last access, else
///   creation) first.
/// - `find_by_prediction_score`: highest score first.
///
/// Ties are broken by ascending id so that paging is stable.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert a snapshot, or replace the stored copy with the same id.
    async fn save(&self, snapshot: &Snapshot) -> StorageResult<SnapshotId>;

    /// Fetch a snapshot by id.
    async fn get(&self, id: &SnapshotId) -> StorageResult<Option<Snapshot>>;

    /// Up to `limit` snapshots of a project, newest first.
    async fn find_by_project(&self, project: &str, limit: usize) -> StorageResult<Vec<Snapshot>> {
        self.find_by_project_page(project, 0, limit).await
    }

    /// One page of a project listing: skip `offset` snapshots in
    /// `find_by_project` order and return up to `limit`.
    async fn find_by_project_page(
        &self,
        project: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Snapshots of `project` created in `[before - hours_back, before]`, newest first.
    async fn find_recent(
        &self,
        project: &str,
        before: DateTime<Utc>,
        hours_back: f64,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Case-insensitive substring search over summary and tags.
    async fn search(&self, query: &str, project: Option<&str>) -> StorageResult<Vec<Snapshot>>;

    /// Replace the persisted tier. Returns `false` if the id is unknown.
    async fn update_memory_tier(&self, id: &SnapshotId, tier: MemoryTier) -> StorageResult<bool>;

    /// Atomically increment `access_count` and advance `last_accessed_at`
    /// to `accessed_at` (never backwards). Returns the updated snapshot, or
    /// `None` if the id is unknown.
    async fn update_access_tracking(
        &self,
        id: &SnapshotId,
        accessed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>>;

    /// Up to `limit` snapshots whose persisted tier is `tier`, oldest first.
    async fn find_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Up to `limit` snapshots whose persisted tier is `tier`, least recently
    /// referenced first. These are the rows most likely to be due for demotion.
    async fn find_stalest_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Replace the cached prediction. Returns `false` if the id is unknown.
    async fn update_propagation(
        &self,
        id: &SnapshotId,
        propagation: &PropagationMetadata,
    ) -> StorageResult<bool>;

    /// Snapshots whose prediction score is at least `min_score`, best first.
    async fn find_by_prediction_score(
        &self,
        min_score: f64,
        project: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Snapshots with no prediction or one computed more than
    /// `hours_stale_threshold` hours ago, oldest first.
    async fn find_stale_predictions(
        &self,
        hours_stale_threshold: f64,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Remove a snapshot. Returns `false` if it did not exist.
    async fn delete(&self, id: &SnapshotId) -> StorageResult<bool>;
}
