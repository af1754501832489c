//! The snapshot entity: one preserved unit of agent context.
//!
//! Snapshots are values. Every transition (`mark_accessed`, tier
//! recomputation, prediction updates) returns a new `Snapshot` and leaves the
//! original untouched; the store then replaces the persisted copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tier::{elapsed_hours, MemoryTier};

/// Unique identifier of a snapshot, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Generate a new random id.
    pub fn new() -> Self {
        SnapshotId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        SnapshotId(s.to_string())
    }
}

impl From<String> for SnapshotId {
    fn from(s: String) -> Self {
        SnapshotId(s)
    }
}

/// Why a snapshot exists and what it builds on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalityMetadata {
    /// Kind of action that produced the snapshot (e.g. "edit", "decision")
    pub action_type: String,
    /// Free-form explanation supplied by the agent
    pub rationale: String,
    /// Snapshots detected as context for this one
    pub dependencies: Vec<SnapshotId>,
    /// Direct parent in the causal chain; `None` for a root cause
    pub caused_by: Option<SnapshotId>,
}

impl CausalityMetadata {
    /// True when this snapshot starts a causal chain.
    pub fn is_root(&self) -> bool {
        self.caused_by.is_none()
    }
}

/// Tag explaining why a prediction score came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionReason {
    HighCompositeScore,
    RecentlyAccessed,
    AccessedToday,
    HighAccessFrequency,
    ModerateAccessFrequency,
    CausalChainRoot,
    CausalChainMember,
    ActiveMemoryTier,
    BaselinePrediction,
}

impl PredictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighCompositeScore => "high_composite_score",
            Self::RecentlyAccessed => "recently_accessed",
            Self::AccessedToday => "accessed_today",
            Self::HighAccessFrequency => "high_access_frequency",
            Self::ModerateAccessFrequency => "moderate_access_frequency",
            Self::CausalChainRoot => "causal_chain_root",
            Self::CausalChainMember => "causal_chain_member",
            Self::ActiveMemoryTier => "active_memory_tier",
            Self::BaselinePrediction => "baseline_prediction",
        }
    }
}

impl std::fmt::Display for PredictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached access prediction for a snapshot.
///
/// `score` is clamped into `[0, 1]` on every construction path, including
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPropagation")]
pub struct PropagationMetadata {
    score: f64,
    computed_at: DateTime<Utc>,
    predicted_next_access: Option<DateTime<Utc>>,
    reasons: Vec<PredictionReason>,
}

#[derive(Deserialize)]
struct RawPropagation {
    score: f64,
    computed_at: DateTime<Utc>,
    predicted_next_access: Option<DateTime<Utc>>,
    reasons: Vec<PredictionReason>,
}

impl From<RawPropagation> for PropagationMetadata {
    fn from(raw: RawPropagation) -> Self {
        PropagationMetadata::new(
            raw.score,
            raw.computed_at,
            raw.predicted_next_access,
            raw.reasons,
        )
    }
}

impl PropagationMetadata {
    pub fn new(
        score: f64,
        computed_at: DateTime<Utc>,
        predicted_next_access: Option<DateTime<Utc>>,
        reasons: Vec<PredictionReason>,
    ) -> Self {
        Self {
            score: clamp_unit(score),
            computed_at,
            predicted_next_access,
            reasons,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn predicted_next_access(&self) -> Option<DateTime<Utc>> {
        self.predicted_next_access
    }

    pub fn reasons(&self) -> &[PredictionReason] {
        &self.reasons
    }

    /// True when the prediction is older than `threshold_hours` at `now`.
    pub fn is_stale(&self, threshold_hours: f64, now: DateTime<Utc>) -> bool {
        elapsed_hours(self.computed_at, now) > threshold_hours
    }
}

/// Clamp into `[0, 1]`; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Every field of a snapshot, open for store backends to fill in.
///
/// Turning parts back into a [`Snapshot`] re-runs validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotParts {
    pub id: SnapshotId,
    pub project: String,
    pub summary: String,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub causality: Option<CausalityMetadata>,
    pub memory_tier: MemoryTier,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub propagation: Option<PropagationMetadata>,
}

/// One preserved unit of agent context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotParts", into = "SnapshotParts")]
pub struct Snapshot {
    id: SnapshotId,
    project: String,
    summary: String,
    source: Option<String>,
    tags: Vec<String>,
    metadata: Option<String>,
    created_at: DateTime<Utc>,
    causality: Option<CausalityMetadata>,
    memory_tier: MemoryTier,
    last_accessed_at: Option<DateTime<Utc>>,
    access_count: u64,
    propagation: Option<PropagationMetadata>,
}

impl Snapshot {
    /// Start building a snapshot for `project` with the given summary.
    pub fn builder(project: impl Into<String>, summary: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder::new(project, summary)
    }

    /// Rehydrate a snapshot from stored parts.
    pub fn from_parts(parts: SnapshotParts) -> Result<Self, ValidationError> {
        validate_required(&parts.project, &parts.summary)?;
        Ok(Self {
            id: parts.id,
            project: parts.project,
            summary: parts.summary,
            source: parts.source,
            tags: parts.tags,
            metadata: parts.metadata,
            created_at: parts.created_at,
            causality: parts.causality,
            memory_tier: parts.memory_tier,
            last_accessed_at: parts.last_accessed_at,
            access_count: parts.access_count,
            propagation: parts.propagation,
        })
    }

    pub fn into_parts(self) -> SnapshotParts {
        SnapshotParts {
            id: self.id,
            project: self.project,
            summary: self.summary,
            source: self.source,
            tags: self.tags,
            metadata: self.metadata,
            created_at: self.created_at,
            causality: self.causality,
            memory_tier: self.memory_tier,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            propagation: self.propagation,
        }
    }

    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn causality(&self) -> Option<&CausalityMetadata> {
        self.causality.as_ref()
    }

    /// Persisted tier, as of the last recomputation.
    pub fn memory_tier(&self) -> MemoryTier {
        self.memory_tier
    }

    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn propagation(&self) -> Option<&PropagationMetadata> {
        self.propagation.as_ref()
    }

    /// `last_accessed_at` if the snapshot was ever accessed, else `created_at`.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    /// Tier this snapshot would have at `now`, regardless of the persisted value.
    pub fn tier_at(&self, now: DateTime<Utc>) -> MemoryTier {
        MemoryTier::classify(self.reference_time(), now)
    }

    /// Record one access at `at`.
    ///
    /// `access_count` grows by one; `last_accessed_at` never moves backwards
    /// even if `at` precedes the previous access.
    pub fn mark_accessed(&self, at: DateTime<Utc>) -> Snapshot {
        let last_accessed_at = match self.last_accessed_at {
            Some(prev) if prev > at => prev,
            _ => at,
        };
        let mut next = self.clone();
        next.access_count = self.access_count.saturating_add(1);
        next.last_accessed_at = Some(last_accessed_at);
        next.memory_tier = MemoryTier::classify(last_accessed_at, at);
        next
    }

    /// Copy with the tier recomputed for `now`.
    pub fn with_recomputed_tier(&self, now: DateTime<Utc>) -> Snapshot {
        self.with_tier(self.tier_at(now))
    }

    /// Copy with the given tier.
    pub fn with_tier(&self, tier: MemoryTier) -> Snapshot {
        let mut next = self.clone();
        next.memory_tier = tier;
        next
    }

    /// Copy carrying a new prediction.
    pub fn with_propagation(&self, propagation: PropagationMetadata) -> Snapshot {
        let mut next = self.clone();
        next.propagation = Some(propagation);
        next
    }

    /// True when no prediction exists or the cached one is older than the threshold.
    pub fn is_prediction_stale(&self, threshold_hours: f64, now: DateTime<Utc>) -> bool {
        match &self.propagation {
            None => true,
            Some(p) => p.is_stale(threshold_hours, now),
        }
    }

    /// Case-insensitive substring match over summary and tags.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.summary.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

impl TryFrom<SnapshotParts> for Snapshot {
    type Error = ValidationError;

    fn try_from(parts: SnapshotParts) -> Result<Self, Self::Error> {
        Snapshot::from_parts(parts)
    }
}

impl From<Snapshot> for SnapshotParts {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.into_parts()
    }
}

fn validate_required(project: &str, summary: &str) -> Result<(), ValidationError> {
    if project.trim().is_empty() {
        return Err(ValidationError::BlankField { field: "project" });
    }
    if summary.trim().is_empty() {
        return Err(ValidationError::BlankField { field: "summary" });
    }
    Ok(())
}

/// Builder for new snapshots; the only way to create one with a fresh id.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    project: String,
    summary: String,
    source: Option<String>,
    tags: Vec<String>,
    metadata: Option<String>,
    causality: Option<CausalityMetadata>,
}

impl SnapshotBuilder {
    pub fn new(project: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            summary: summary.into(),
            source: None,
            tags: Vec::new(),
            metadata: None,
            causality: None,
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn causality(mut self, causality: CausalityMetadata) -> Self {
        self.causality = Some(causality);
        self
    }

    /// Validate and create the snapshot with `created_at = now`.
    pub fn build_at(self, now: DateTime<Utc>) -> Result<Snapshot, ValidationError> {
        validate_required(&self.project, &self.summary)?;
        Ok(Snapshot {
            id: SnapshotId::new(),
            project: self.project,
            summary: self.summary,
            source: self.source,
            tags: self.tags,
            metadata: self.metadata,
            created_at: now,
            causality: self.causality,
            memory_tier: MemoryTier::classify(now, now),
            last_accessed_at: None,
            access_count: 0,
            propagation: None,
        })
    }

    /// Validate and create the snapshot stamped with the wall clock.
    pub fn build(self) -> Result<Snapshot, ValidationError> {
        self.build_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn blank_project_is_rejected() {
        let err = Snapshot::builder("   ", "summary").build().unwrap_err();
        assert_eq!(err, ValidationError::BlankField { field: "project" });
    }

    #[test]
    fn blank_summary_is_rejected() {
        let err = Snapshot::builder("proj", "").build().unwrap_err();
        assert_eq!(err, ValidationError::BlankField { field: "summary" });
    }

    #[test]
    fn new_snapshot_starts_active_and_unaccessed() {
        let s = Snapshot::builder("proj", "refactored parser")
            .source("editor")
            .tag("rust")
            .build()
            .unwrap();
        assert_eq!(s.memory_tier(), MemoryTier::Active);
        assert_eq!(s.access_count(), 0);
        assert!(s.last_accessed_at().is_none());
        assert!(s.propagation().is_none());
        assert_eq!(s.source(), Some("editor"));
    }

    #[test]
    fn mark_accessed_returns_new_value_and_leaves_original() {
        let t0 = Utc::now() - Duration::hours(2);
        let s = Snapshot::builder("proj", "s").build_at(t0).unwrap();
        let now = t0 + Duration::hours(2);
        let accessed = s.mark_accessed(now);

        assert_eq!(s.access_count(), 0);
        assert_eq!(accessed.access_count(), 1);
        assert_eq!(accessed.last_accessed_at(), Some(now));
        assert_eq!(accessed.memory_tier(), MemoryTier::Active);
        assert_eq!(accessed.id(), s.id());
        assert_eq!(accessed.created_at(), s.created_at());
    }

    #[test]
    fn mark_accessed_never_moves_last_access_backwards() {
        let now = Utc::now();
        let s = Snapshot::builder("proj", "s")
            .build_at(now - Duration::hours(5))
            .unwrap()
            .mark_accessed(now);
        let again = s.mark_accessed(now - Duration::hours(1));
        assert_eq!(again.last_accessed_at(), Some(now));
        assert_eq!(again.access_count(), 2);
    }

    #[test]
    fn recomputed_tier_uses_creation_when_never_accessed() {
        let t0 = Utc::now();
        let s = Snapshot::builder("proj", "s").build_at(t0).unwrap();
        let later = s.with_recomputed_tier(t0 + Duration::hours(2));
        assert_eq!(later.memory_tier(), MemoryTier::Recent);
        assert_eq!(s.memory_tier(), MemoryTier::Active);
    }

    #[test]
    fn propagation_score_is_clamped() {
        let now = Utc::now();
        assert_eq!(PropagationMetadata::new(1.7, now, None, vec![]).score(), 1.0);
        assert_eq!(PropagationMetadata::new(-0.2, now, None, vec![]).score(), 0.0);
        assert_eq!(PropagationMetadata::new(f64::NAN, now, None, vec![]).score(), 0.0);
    }

    #[test]
    fn deserialized_propagation_is_clamped() {
        let json = serde_json::json!({
            "score": 3.0,
            "computed_at": Utc::now(),
            "predicted_next_access": null,
            "reasons": ["baseline_prediction"],
        });
        let p: PropagationMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(p.score(), 1.0);
        assert_eq!(p.reasons(), &[PredictionReason::BaselinePrediction]);
    }

    #[test]
    fn deserializing_blank_summary_fails() {
        let s = Snapshot::builder("proj", "ok").build().unwrap();
        let mut value = serde_json::to_value(&s).unwrap();
        value["summary"] = serde_json::json!(" ");
        assert!(serde_json::from_value::<Snapshot>(value).is_err());
    }

    #[test]
    fn prediction_staleness() {
        let now = Utc::now();
        let s = Snapshot::builder("proj", "s").build_at(now).unwrap();
        assert!(s.is_prediction_stale(24.0, now));

        let fresh = s.with_propagation(PropagationMetadata::new(0.5, now, None, vec![]));
        assert!(!fresh.is_prediction_stale(24.0, now + Duration::hours(1)));
        assert!(fresh.is_prediction_stale(24.0, now + Duration::hours(25)));
    }

    #[test]
    fn query_matches_summary_and_tags_case_insensitively() {
        let s = Snapshot::builder("proj", "Fixed the Tokenizer")
            .tag("Lexer")
            .build()
            .unwrap();
        assert!(s.matches_query("tokenizer"));
        assert!(s.matches_query("LEX"));
        assert!(!s.matches_query("parser"));
    }
}
