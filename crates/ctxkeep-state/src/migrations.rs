//! SurrealDB schema migrations and initialization
//!
//! Sets up the `snapshots` table with the indexes the store queries rely on.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize all ctxkeep tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing ctxkeep SurrealDB schema");
    init_snapshots_table(db).await?;
    info!("ctxkeep schema initialization complete");
    Ok(())
}

/// Initialize `snapshots` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE snapshots {
///   snapshot_id:              STRING (unique)
///   project:                  STRING (indexed)
///   summary:                  STRING
///   source:                   STRING?
///   tags:                     ARRAY<STRING>
///   metadata:                 STRING?
///   created_at:               DATETIME (indexed)
///   causality:                OBJECT?
///   memory_tier:              STRING (enum: active | recent | archived | expired)
///   last_accessed_at:         DATETIME?
///   access_count:             INT
///   propagation_score:        FLOAT? (indexed)
///   propagation_computed_at:  DATETIME?
///   predicted_next_access:    DATETIME?
///   propagation_reasons:      ARRAY<STRING>?
/// }
/// ```
///
/// Deletes are allowed: the pruning sweep removes expired snapshots.
async fn init_snapshots_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing snapshots table");

    let sql = r#"
        DEFINE TABLE snapshots SCHEMALESS
            PERMISSIONS FOR select, create, update, delete FULL;

        DEFINE INDEX idx_snapshot_id ON TABLE snapshots COLUMNS snapshot_id UNIQUE;

        -- Project listing and dependency lookback
        DEFINE INDEX idx_project_created_at ON TABLE snapshots COLUMNS project, created_at;

        -- Tier sweeps and pruning
        DEFINE INDEX idx_memory_tier ON TABLE snapshots COLUMNS memory_tier;

        -- High-value candidate lookup
        DEFINE INDEX idx_propagation_score ON TABLE snapshots COLUMNS propagation_score;

        -- Stale prediction sweeps
        DEFINE INDEX idx_propagation_computed_at ON TABLE snapshots COLUMNS propagation_computed_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ snapshots table initialized");
    Ok(())
}
