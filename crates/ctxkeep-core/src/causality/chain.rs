//! Causal chains reconstructed from `caused_by` pointers.

use ctxkeep_state::{Snapshot, SnapshotId};
use serde::{Deserialize, Serialize};

/// One step of a causal chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    pub snapshot: Snapshot,
    /// Distance from the root (root = 0).
    pub depth: usize,
}

/// Why the backward walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainTermination {
    /// Reached a snapshot without a parent.
    Root,
    /// `at` was already on the chain; the links hold the partial walk.
    Cycle { at: SnapshotId },
    /// A `caused_by` pointer to `id` did not resolve.
    MissingParent { id: SnapshotId },
}

/// Ordered causal chain, root first, ending at the requested snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalChain {
    pub links: Vec<ChainLink>,
    pub termination: ChainTermination,
}

impl CausalChain {
    /// Build from snapshots collected while walking backwards from the target.
    pub(crate) fn from_backward_walk(
        mut walked: Vec<Snapshot>,
        termination: ChainTermination,
    ) -> Self {
        walked.reverse();
        let links = walked
            .into_iter()
            .enumerate()
            .map(|(depth, snapshot)| ChainLink { snapshot, depth })
            .collect();
        Self { links, termination }
    }

    /// True only when the walk reached a genuine root.
    pub fn is_complete(&self) -> bool {
        self.termination == ChainTermination::Root
    }

    pub fn has_cycle(&self) -> bool {
        matches!(self.termination, ChainTermination::Cycle { .. })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// First snapshot of the chain (the root when complete).
    pub fn root(&self) -> Option<&Snapshot> {
        self.links.first().map(|l| &l.snapshot)
    }

    /// The snapshot the chain was built for.
    pub fn target(&self) -> Option<&Snapshot> {
        self.links.last().map(|l| &l.snapshot)
    }

    pub fn ids(&self) -> Vec<SnapshotId> {
        self.links.iter().map(|l| l.snapshot.id().clone()).collect()
    }

    /// Creation times never decrease from root to target.
    pub fn timestamps_non_decreasing(&self) -> bool {
        self.links
            .windows(2)
            .all(|w| w[0].snapshot.created_at() <= w[1].snapshot.created_at())
    }

    /// Complete and chronologically consistent.
    pub fn is_valid(&self) -> bool {
        self.is_complete() && self.timestamps_non_decreasing()
    }
}
