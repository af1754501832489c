//! Pure scoring functions behind access prediction.
//!
//! Every function takes an explicit `now` and is total over valid snapshots.

use chrono::{DateTime, Duration, Utc};
use ctxkeep_state::{
    clamp_unit, elapsed_hours, MemoryTier, PredictionReason, PropagationMetadata, Snapshot,
};

const TEMPORAL_WEIGHT: f64 = 0.4;
const CAUSAL_WEIGHT: f64 = 0.3;
const FREQUENCY_WEIGHT: f64 = 0.3;

/// Hours over which the temporal score decays by a factor of `e`.
const TEMPORAL_DECAY_HOURS: f64 = 24.0;

/// Predictions are never placed further ahead than this.
pub const MAX_PREDICTION_HORIZON_DAYS: i64 = 7;

/// Composite score at or above which `HighCompositeScore` is reported.
pub const HIGH_SCORE_THRESHOLD: f64 = 0.7;

/// Causal weight derived from the snapshot's own causality metadata.
///
/// Roots are worth more the more they fan out; chain members are capped
/// lower; a member with no dependencies gets a small fixed weight.
pub fn causal_strength(snapshot: &Snapshot) -> f64 {
    let Some(causality) = snapshot.causality() else {
        return 0.0;
    };
    let k = causality.dependencies.len() as f64;
    if causality.is_root() {
        (0.5 + 0.1 * k).min(1.0)
    } else if k > 0.0 {
        (0.3 + 0.1 * k).min(0.7)
    } else {
        0.2
    }
}

fn tier_base(tier: MemoryTier) -> f64 {
    match tier {
        MemoryTier::Active => 0.3,
        MemoryTier::Recent => 0.2,
        MemoryTier::Archived => 0.1,
        MemoryTier::Expired => 0.0,
    }
}

/// Recency component: exponential decay since the last access, or a
/// tier-based base value for snapshots never accessed.
pub fn temporal_score(snapshot: &Snapshot, now: DateTime<Utc>) -> f64 {
    match snapshot.last_accessed_at() {
        Some(last) => {
            let hours = elapsed_hours(last, now).max(0.0);
            (-hours / TEMPORAL_DECAY_HOURS).exp()
        }
        None => tier_base(snapshot.tier_at(now)),
    }
}

/// Log-scaled access frequency; 100 accesses saturate at 1.
pub fn frequency_score(access_count: u64) -> f64 {
    if access_count == 0 {
        return 0.0;
    }
    ((access_count as f64 + 1.0).ln() / 101f64.ln()).min(1.0)
}

/// Weighted composite in `[0, 1]`.
pub fn calculate_score(snapshot: &Snapshot, causal_strength: f64, now: DateTime<Utc>) -> f64 {
    clamp_unit(
        TEMPORAL_WEIGHT * temporal_score(snapshot, now)
            + CAUSAL_WEIGHT * clamp_unit(causal_strength)
            + FREQUENCY_WEIGHT * frequency_score(snapshot.access_count()),
    )
}

/// When the snapshot is next likely to be read, from its access rhythm.
///
/// `None` if it has never been accessed. Never later than seven days after `now`.
pub fn estimate_next_access(snapshot: &Snapshot, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let last = snapshot.last_accessed_at()?;
    let count = snapshot.access_count();

    let predicted = if count <= 1 {
        last + Duration::days(1)
    } else {
        let span = (last - snapshot.created_at()).num_milliseconds().max(0);
        last + Duration::milliseconds(span / count as i64)
    };

    Some(predicted.min(now + Duration::days(MAX_PREDICTION_HORIZON_DAYS)))
}

/// Explanation tags for a score. Not mutually exclusive; falls back to
/// `BaselinePrediction` when nothing else applies.
pub fn generate_reasons(
    snapshot: &Snapshot,
    score: f64,
    causal_strength: f64,
    now: DateTime<Utc>,
) -> Vec<PredictionReason> {
    let mut reasons = Vec::new();

    if score >= HIGH_SCORE_THRESHOLD {
        reasons.push(PredictionReason::HighCompositeScore);
    }

    if let Some(last) = snapshot.last_accessed_at() {
        let hours = elapsed_hours(last, now);
        if hours < 1.0 {
            reasons.push(PredictionReason::RecentlyAccessed);
        } else if hours < 24.0 {
            reasons.push(PredictionReason::AccessedToday);
        }
    }

    let count = snapshot.access_count();
    if count >= 10 {
        reasons.push(PredictionReason::HighAccessFrequency);
    } else if count >= 3 {
        reasons.push(PredictionReason::ModerateAccessFrequency);
    }

    if causal_strength >= 0.5 {
        reasons.push(PredictionReason::CausalChainRoot);
    } else if causal_strength >= 0.3 {
        reasons.push(PredictionReason::CausalChainMember);
    }

    if snapshot.tier_at(now) == MemoryTier::Active {
        reasons.push(PredictionReason::ActiveMemoryTier);
    }

    if reasons.is_empty() {
        reasons.push(PredictionReason::BaselinePrediction);
    }
    reasons
}

/// Full prediction for a snapshot at `now`.
pub fn compute_prediction(snapshot: &Snapshot, now: DateTime<Utc>) -> PropagationMetadata {
    let strength = causal_strength(snapshot);
    let score = calculate_score(snapshot, strength, now);
    PropagationMetadata::new(
        score,
        now,
        estimate_next_access(snapshot, now),
        generate_reasons(snapshot, score, strength, now),
    )
}
