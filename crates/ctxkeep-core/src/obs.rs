//! Structured observability hooks for snapshot lifecycle events.
//!
//! This module provides:
//! - Snapshot-scoped tracing spans via `SnapshotSpan` RAII guard
//! - Emission functions for key events: save, access, tier sweeps, pruning,
//!   prediction refresh and cycle detection
//!
//! Events are emitted at `info!` level unless noted; failures at `warn!`.

use tracing::info;

/// RAII guard that enters a snapshot-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SnapshotSpan::enter("5f0c...", "my-project");
/// // tracing calls are now associated with snapshot_id and project
/// ```
pub struct SnapshotSpan {
    _span: tracing::span::EnteredSpan,
}

impl SnapshotSpan {
    /// Create and enter a span tagged with the snapshot id and project.
    pub fn enter(snapshot_id: &str, project: &str) -> Self {
        let span = tracing::info_span!(
            "ctxkeep.snapshot",
            snapshot_id = %snapshot_id,
            project = %project
        );
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: snapshot persisted by the write path.
pub fn emit_snapshot_saved(snapshot_id: &str, project: &str, dependencies: usize) {
    info!(
        event = "snapshot.saved",
        snapshot_id = %snapshot_id,
        project = %project,
        dependencies = dependencies,
    );
}

/// Emit event: access recorded (debug level, this fires on every read).
pub fn emit_access_tracked(snapshot_id: &str, access_count: u64, tier: &str) {
    tracing::debug!(
        event = "access.tracked",
        snapshot_id = %snapshot_id,
        access_count = access_count,
        tier = %tier,
    );
}

/// Emit event: fire-and-forget access tracking failed (warning level).
pub fn emit_access_tracking_failed(snapshot_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "access.tracking_failed", snapshot_id = %snapshot_id, error = %error);
}

/// Emit event: tier recalculation sweep finished.
pub fn emit_tiers_recalculated(project: Option<&str>, examined: usize, changed: usize) {
    info!(
        event = "tiers.recalculated",
        project = project.unwrap_or("*"),
        examined = examined,
        changed = changed,
    );
}

/// Emit event: pruning sweep finished.
pub fn emit_prune_completed(candidates: usize, deleted: usize) {
    info!(event = "prune.completed", candidates = candidates, deleted = deleted);
}

/// Emit event: prediction refresh sweep finished.
pub fn emit_predictions_updated(project: &str, updated: usize) {
    info!(event = "predictions.updated", project = %project, updated = updated);
}

/// Emit event: a `caused_by` cycle was found while walking a chain (warning level).
pub fn emit_causal_cycle_detected(start_id: &str, repeated_id: &str, partial_len: usize) {
    tracing::warn!(
        event = "causal_chain.cycle_detected",
        start_id = %start_id,
        repeated_id = %repeated_id,
        partial_len = partial_len,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_span_create() {
        let _span = SnapshotSpan::enter("test-snapshot-id", "proj");
    }
}
