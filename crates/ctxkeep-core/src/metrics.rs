//! Global atomic counters for ctxkeep observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a maintenance cycle).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; updates never allocate or lock.
pub struct Metrics {
    snapshots_saved: AtomicU64,
    accesses_tracked: AtomicU64,
    access_tracking_failures: AtomicU64,
    tier_changes: AtomicU64,
    snapshots_pruned: AtomicU64,
    predictions_updated: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            snapshots_saved: AtomicU64::new(0),
            accesses_tracked: AtomicU64::new(0),
            access_tracking_failures: AtomicU64::new(0),
            tier_changes: AtomicU64::new(0),
            snapshots_pruned: AtomicU64::new(0),
            predictions_updated: AtomicU64::new(0),
        }
    }

    pub fn inc_snapshots_saved(&self) {
        self.snapshots_saved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_saved", "counter incremented");
    }

    pub fn inc_accesses_tracked(&self) {
        self.accesses_tracked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "accesses_tracked", "counter incremented");
    }

    pub fn inc_access_tracking_failures(&self) {
        self.access_tracking_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "access_tracking_failures", "counter incremented");
    }

    /// Add `n` persisted tier changes.
    pub fn add_tier_changes(&self, n: u64) {
        self.tier_changes.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "tier_changes", n, "counter incremented");
    }

    /// Add `n` deleted snapshots.
    pub fn add_snapshots_pruned(&self, n: u64) {
        self.snapshots_pruned.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_pruned", n, "counter incremented");
    }

    /// Add `n` recomputed predictions.
    pub fn add_predictions_updated(&self, n: u64) {
        self.predictions_updated.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "predictions_updated", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (daemon tick, shutdown)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            snapshots_saved = self.snapshots_saved(),
            accesses_tracked = self.accesses_tracked(),
            access_tracking_failures = self.access_tracking_failures(),
            tier_changes = self.tier_changes(),
            snapshots_pruned = self.snapshots_pruned(),
            predictions_updated = self.predictions_updated(),
        );
    }

    pub fn snapshots_saved(&self) -> u64 {
        self.snapshots_saved.load(Ordering::Relaxed)
    }

    pub fn accesses_tracked(&self) -> u64 {
        self.accesses_tracked.load(Ordering::Relaxed)
    }

    pub fn access_tracking_failures(&self) -> u64 {
        self.access_tracking_failures.load(Ordering::Relaxed)
    }

    pub fn tier_changes(&self) -> u64 {
        self.tier_changes.load(Ordering::Relaxed)
    }

    pub fn snapshots_pruned(&self) -> u64 {
        self.snapshots_pruned.load(Ordering::Relaxed)
    }

    pub fn predictions_updated(&self) -> u64 {
        self.predictions_updated.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.snapshots_saved.store(0, Ordering::Relaxed);
        self.accesses_tracked.store(0, Ordering::Relaxed);
        self.access_tracking_failures.store(0, Ordering::Relaxed);
        self.tier_changes.store(0, Ordering::Relaxed);
        self.snapshots_pruned.store(0, Ordering::Relaxed);
        self.predictions_updated.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.snapshots_saved(), 0);
        m.inc_snapshots_saved();
        m.inc_snapshots_saved();
        assert_eq!(m.snapshots_saved(), 2);

        m.inc_accesses_tracked();
        m.inc_access_tracking_failures();
        assert_eq!(m.accesses_tracked(), 1);
        assert_eq!(m.access_tracking_failures(), 1);

        m.add_tier_changes(3);
        m.add_snapshots_pruned(4);
        m.add_predictions_updated(5);
        assert_eq!(m.tier_changes(), 3);
        assert_eq!(m.snapshots_pruned(), 4);
        assert_eq!(m.predictions_updated(), 5);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_snapshots_saved();
        m.inc_accesses_tracked();
        m.add_snapshots_pruned(2);
        m.reset();
        assert_eq!(m.snapshots_saved(), 0);
        assert_eq!(m.accesses_tracked(), 0);
        assert_eq!(m.snapshots_pruned(), 0);
    }
}
