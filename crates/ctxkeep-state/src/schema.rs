//! Row mapping for the SurrealDB `snapshots` table
//!
//! The prediction is flattened into top-level columns so score and staleness
//! can be filtered and ordered by the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::snapshot::{
    CausalityMetadata, PredictionReason, PropagationMetadata, Snapshot, SnapshotId, SnapshotParts,
};
use crate::tier::MemoryTier;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// One row of the `snapshots` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub snapshot_id: String,
    pub project: String,
    pub summary: String,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    pub causality: Option<CausalityMetadata>,
    /// Lowercase tier name (see `MemoryTier::as_str`)
    pub memory_tier: String,
    #[serde(default, with = "surreal_datetime_opt")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    #[serde(default)]
    pub propagation_score: Option<f64>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub propagation_computed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub predicted_next_access: Option<DateTime<Utc>>,
    #[serde(default)]
    pub propagation_reasons: Option<Vec<PredictionReason>>,
}

impl SnapshotRow {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let propagation = snapshot.propagation();
        Self {
            snapshot_id: snapshot.id().as_str().to_string(),
            project: snapshot.project().to_string(),
            summary: snapshot.summary().to_string(),
            source: snapshot.source().map(str::to_string),
            tags: snapshot.tags().to_vec(),
            metadata: snapshot.metadata().map(str::to_string),
            created_at: snapshot.created_at(),
            causality: snapshot.causality().cloned(),
            memory_tier: snapshot.memory_tier().as_str().to_string(),
            last_accessed_at: snapshot.last_accessed_at(),
            access_count: snapshot.access_count(),
            propagation_score: propagation.map(|p| p.score()),
            propagation_computed_at: propagation.map(|p| p.computed_at()),
            predicted_next_access: propagation.and_then(|p| p.predicted_next_access()),
            propagation_reasons: propagation.map(|p| p.reasons().to_vec()),
        }
    }

    pub fn into_snapshot(self) -> Result<Snapshot, StorageError> {
        let memory_tier = MemoryTier::parse(&self.memory_tier).ok_or_else(|| {
            StorageError::Serialization(format!("unknown memory tier: {}", self.memory_tier))
        })?;

        let propagation = match (self.propagation_score, self.propagation_computed_at) {
            (Some(score), Some(computed_at)) => Some(PropagationMetadata::new(
                score,
                computed_at,
                self.predicted_next_access,
                self.propagation_reasons.unwrap_or_default(),
            )),
            _ => None,
        };

        let snapshot = Snapshot::from_parts(SnapshotParts {
            id: SnapshotId::from(self.snapshot_id),
            project: self.project,
            summary: self.summary,
            source: self.source,
            tags: self.tags,
            metadata: self.metadata,
            created_at: self.created_at,
            causality: self.causality,
            memory_tier,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            propagation,
        })?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_conversion_preserves_prediction() {
        let now = Utc::now();
        let snapshot = Snapshot::builder("proj", "summary")
            .tag("a")
            .build_at(now)
            .unwrap()
            .with_propagation(PropagationMetadata::new(
                0.42,
                now,
                Some(now),
                vec![PredictionReason::ActiveMemoryTier],
            ));

        let back = SnapshotRow::from_snapshot(&snapshot).into_snapshot().unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let snapshot = Snapshot::builder("proj", "summary").build().unwrap();
        let mut row = SnapshotRow::from_snapshot(&snapshot);
        row.memory_tier = "frozen".into();
        assert!(matches!(
            row.into_snapshot(),
            Err(StorageError::Serialization(_))
        ));
    }
}
