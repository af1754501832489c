//! SurrealDB-backed SnapshotStore implementation
//!
//! Uses `schema::SnapshotRow` for persistence, converting to/from `Snapshot`
//! at the boundary. Single-field updates are issued as one `UPDATE`
//! statement so concurrent writers cannot lose increments.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::connection;
use crate::error::StorageError;
use crate::migrations;
use crate::schema::SnapshotRow;
use crate::snapshot::{PropagationMetadata, Snapshot, SnapshotId};
use crate::storage_traits::{SnapshotStore, StorageResult};
use crate::tier::MemoryTier;

/// SurrealDB-backed implementation of [`SnapshotStore`].
#[derive(Clone)]
pub struct SurrealSnapshotStore {
    db: Surreal<Any>,
}

impl SurrealSnapshotStore {
    /// Wrap an existing connection and make sure the schema exists.
    pub async fn new(db: Surreal<Any>) -> StorageResult<Self> {
        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        let db = connection::connect_in_memory().await?;
        let store = Self::new(db).await?;
        info!("SurrealSnapshotStore connected (in-memory)");
        Ok(store)
    }

    /// Create from environment variables.
    ///
    /// See [`connection::connect_from_env`] for the variable chain.
    pub async fn from_env() -> StorageResult<Self> {
        let db = connection::connect_from_env().await?;
        Self::new(db).await
    }

    // -- private helpers -----------------------------------------------------

    fn rows_to_snapshots(rows: Vec<SnapshotRow>) -> StorageResult<Vec<Snapshot>> {
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn select_rows(
        &self,
        sql: &'static str,
        binds: Vec<(&'static str, serde_json::Value)>,
    ) -> StorageResult<Vec<SnapshotRow>> {
        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let mut res = query.await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(rows)
    }

    async fn fetch_row(&self, id: &SnapshotId) -> StorageResult<Option<SnapshotRow>> {
        let id_owned = id.as_str().to_string();
        let mut res = self
            .db
            .query("SELECT * FROM snapshots WHERE snapshot_id = $id")
            .bind(("id", id_owned))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl SnapshotStore for SurrealSnapshotStore {
    #[instrument(skip(self, snapshot), fields(snapshot_id = %snapshot.id(), project = %snapshot.project()))]
    async fn save(&self, snapshot: &Snapshot) -> StorageResult<SnapshotId> {
        let row = SnapshotRow::from_snapshot(snapshot);

        if self.fetch_row(snapshot.id()).await?.is_some() {
            debug!("replacing snapshot");
            let id_owned = snapshot.id().as_str().to_string();
            self.db
                .query("UPDATE snapshots CONTENT $row WHERE snapshot_id = $id")
                .bind(("row", row))
                .bind(("id", id_owned))
                .await?;
        } else {
            debug!("creating snapshot");
            let created: Option<SnapshotRow> =
                self.db.create("snapshots").content(row).await?;
            if created.is_none() {
                return Err(StorageError::Backend(
                    "Failed to create snapshot".to_string(),
                ));
            }
        }

        Ok(snapshot.id().clone())
    }

    async fn get(&self, id: &SnapshotId) -> StorageResult<Option<Snapshot>> {
        self.fetch_row(id)
            .await?
            .map(SnapshotRow::into_snapshot)
            .transpose()
    }

    async fn find_by_project_page(
        &self,
        project: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let rows = self
            .select_rows(
                "SELECT * FROM snapshots WHERE project = $project \
                 ORDER BY created_at DESC, snapshot_id ASC LIMIT $limit START $offset",
                vec![
                    ("project", serde_json::json!(project)),
                    ("limit", serde_json::json!(limit)),
                    ("offset", serde_json::json!(offset)),
                ],
            )
            .await?;
        Self::rows_to_snapshots(rows)
    }

    async fn find_recent(
        &self,
        project: &str,
        before: DateTime<Utc>,
        hours_back: f64,
    ) -> StorageResult<Vec<Snapshot>> {
        let since = before - Duration::milliseconds((hours_back * 3_600_000.0) as i64);
        let mut res = self
            .db
            .query(
                "SELECT * FROM snapshots WHERE project = $project \
                 AND created_at >= $since AND created_at <= $before \
                 ORDER BY created_at DESC",
            )
            .bind(("project", project.to_string()))
            .bind(("since", SurrealDatetime::from(since)))
            .bind(("before", SurrealDatetime::from(before)))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Self::rows_to_snapshots(rows)
    }

    async fn search(&self, query: &str, project: Option<&str>) -> StorageResult<Vec<Snapshot>> {
        let rows = match project {
            Some(p) => {
                self.select_rows(
                    "SELECT * FROM snapshots WHERE project = $project ORDER BY created_at DESC",
                    vec![("project", serde_json::json!(p))],
                )
                .await?
            }
            None => {
                self.select_rows("SELECT * FROM snapshots ORDER BY created_at DESC", vec![])
                    .await?
            }
        };
        let snapshots = Self::rows_to_snapshots(rows)?;
        Ok(snapshots
            .into_iter()
            .filter(|s| s.matches_query(query))
            .collect())
    }

    #[instrument(skip(self), fields(snapshot_id = %id, tier = %tier))]
    async fn update_memory_tier(&self, id: &SnapshotId, tier: MemoryTier) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("UPDATE snapshots SET memory_tier = $tier WHERE snapshot_id = $id RETURN AFTER")
            .bind(("tier", tier.as_str().to_string()))
            .bind(("id", id.as_str().to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self), fields(snapshot_id = %id))]
    async fn update_access_tracking(
        &self,
        id: &SnapshotId,
        accessed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>> {
        let mut res = self
            .db
            .query(
                "UPDATE snapshots SET \
                     access_count += 1, \
                     last_accessed_at = IF last_accessed_at = NONE OR last_accessed_at < $at \
                         THEN $at ELSE last_accessed_at END \
                 WHERE snapshot_id = $id RETURN AFTER",
            )
            .bind(("at", SurrealDatetime::from(accessed_at)))
            .bind(("id", id.as_str().to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(SnapshotRow::into_snapshot)
            .transpose()
    }

    async fn find_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let rows = self
            .select_rows(
                "SELECT * FROM snapshots WHERE memory_tier = $tier \
                 ORDER BY created_at ASC, snapshot_id ASC LIMIT $limit",
                vec![
                    ("tier", serde_json::json!(tier.as_str())),
                    ("limit", serde_json::json!(limit)),
                ],
            )
            .await?;
        Self::rows_to_snapshots(rows)
    }

    async fn find_stalest_by_memory_tier(
        &self,
        tier: MemoryTier,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let rows = self
            .select_rows(
                "SELECT *, last_accessed_at ?? created_at AS reference_at FROM snapshots \
                 WHERE memory_tier = $tier \
                 ORDER BY reference_at ASC, snapshot_id ASC LIMIT $limit",
                vec![
                    ("tier", serde_json::json!(tier.as_str())),
                    ("limit", serde_json::json!(limit)),
                ],
            )
            .await?;
        Self::rows_to_snapshots(rows)
    }

    #[instrument(skip(self, propagation), fields(snapshot_id = %id, score = propagation.score()))]
    async fn update_propagation(
        &self,
        id: &SnapshotId,
        propagation: &PropagationMetadata,
    ) -> StorageResult<bool> {
        let mut res = self
            .db
            .query(
                "UPDATE snapshots SET \
                     propagation_score = $score, \
                     propagation_computed_at = $computed_at, \
                     predicted_next_access = $predicted, \
                     propagation_reasons = $reasons \
                 WHERE snapshot_id = $id RETURN AFTER",
            )
            .bind(("score", propagation.score()))
            .bind((
                "computed_at",
                SurrealDatetime::from(propagation.computed_at()),
            ))
            .bind((
                "predicted",
                propagation.predicted_next_access().map(SurrealDatetime::from),
            ))
            .bind(("reasons", propagation.reasons().to_vec()))
            .bind(("id", id.as_str().to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn find_by_prediction_score(
        &self,
        min_score: f64,
        project: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let rows = match project {
            Some(p) => {
                self.select_rows(
                    "SELECT * FROM snapshots WHERE project = $project \
                     AND propagation_score != NONE AND propagation_score >= $min \
                     ORDER BY propagation_score DESC LIMIT $limit",
                    vec![
                        ("project", serde_json::json!(p)),
                        ("min", serde_json::json!(min_score)),
                        ("limit", serde_json::json!(limit)),
                    ],
                )
                .await?
            }
            None => {
                self.select_rows(
                    "SELECT * FROM snapshots WHERE propagation_score != NONE \
                     AND propagation_score >= $min \
                     ORDER BY propagation_score DESC LIMIT $limit",
                    vec![
                        ("min", serde_json::json!(min_score)),
                        ("limit", serde_json::json!(limit)),
                    ],
                )
                .await?
            }
        };
        Self::rows_to_snapshots(rows)
    }

    async fn find_stale_predictions(
        &self,
        hours_stale_threshold: f64,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let cutoff =
            Utc::now() - Duration::milliseconds((hours_stale_threshold * 3_600_000.0) as i64);
        let mut res = self
            .db
            .query(
                "SELECT * FROM snapshots \
                 WHERE propagation_computed_at = NONE OR propagation_computed_at < $cutoff \
                 ORDER BY created_at ASC, snapshot_id ASC LIMIT $limit",
            )
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .bind(("limit", limit))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Self::rows_to_snapshots(rows)
    }

    #[instrument(skip(self), fields(snapshot_id = %id))]
    async fn delete(&self, id: &SnapshotId) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("DELETE snapshots WHERE snapshot_id = $id RETURN BEFORE")
            .bind(("id", id.as_str().to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }
}
