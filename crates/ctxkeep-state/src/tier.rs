//! Temporal relevance tiers.
//!
//! A snapshot's tier is a pure function of its reference time (last access,
//! else creation) and the current clock. It is not monotonic over calendar
//! time: an access resets the reference time and moves the snapshot back
//! toward `Active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive, hours) of the `Active` tier.
pub const ACTIVE_HOURS: f64 = 1.0;
/// Upper bound (exclusive, hours) of the `Recent` tier.
pub const RECENT_HOURS: f64 = 24.0;
/// Upper bound (exclusive, hours) of the `Archived` tier; anything older is `Expired`.
pub const ARCHIVED_HOURS: f64 = 720.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Memory tier of a snapshot, ordered from freshest to stalest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryTier {
    Active,
    Recent,
    Archived,
    Expired,
}

impl MemoryTier {
    /// Every tier, freshest first.
    pub const ALL: [MemoryTier; 4] = [
        MemoryTier::Active,
        MemoryTier::Recent,
        MemoryTier::Archived,
        MemoryTier::Expired,
    ];

    /// Classify by hours elapsed since the reference time.
    ///
    /// Negative ages (reference time in the future, e.g. clock skew between
    /// writers) classify as `Active`.
    pub fn from_age_hours(age_hours: f64) -> Self {
        if age_hours < ACTIVE_HOURS {
            MemoryTier::Active
        } else if age_hours < RECENT_HOURS {
            MemoryTier::Recent
        } else if age_hours < ARCHIVED_HOURS {
            MemoryTier::Archived
        } else {
            MemoryTier::Expired
        }
    }

    /// Classify a reference time relative to `now`.
    pub fn classify(reference_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_age_hours(elapsed_hours(reference_time, now))
    }

    /// Stable lowercase name used in storage rows and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Active => "active",
            MemoryTier::Recent => "recent",
            MemoryTier::Archived => "archived",
            MemoryTier::Expired => "expired",
        }
    }

    /// Inverse of [`MemoryTier::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MemoryTier::Active),
            "recent" => Some(MemoryTier::Recent),
            "archived" => Some(MemoryTier::Archived),
            "expired" => Some(MemoryTier::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryTier::Active => write!(f, "ACTIVE"),
            MemoryTier::Recent => write!(f, "RECENT"),
            MemoryTier::Archived => write!(f, "ARCHIVED"),
            MemoryTier::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Fractional hours from `earlier` to `later` (millisecond resolution).
pub fn elapsed_hours(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hours(h: f64) -> Duration {
        Duration::milliseconds((h * MILLIS_PER_HOUR).round() as i64)
    }

    #[test]
    fn boundaries_classify_as_expected() {
        let now = Utc::now();
        let cases = [
            (0.0, MemoryTier::Active),
            (0.99, MemoryTier::Active),
            (1.0, MemoryTier::Recent),
            (23.99, MemoryTier::Recent),
            (24.0, MemoryTier::Archived),
            (719.99, MemoryTier::Archived),
            (720.0, MemoryTier::Expired),
        ];
        for (age, expected) in cases {
            assert_eq!(
                MemoryTier::classify(now - hours(age), now),
                expected,
                "age {age}h"
            );
        }
    }

    #[test]
    fn future_reference_is_active() {
        let now = Utc::now();
        assert_eq!(
            MemoryTier::classify(now + Duration::hours(3), now),
            MemoryTier::Active
        );
    }

    #[test]
    fn tiers_order_by_staleness() {
        assert!(MemoryTier::Active < MemoryTier::Recent);
        assert!(MemoryTier::Archived < MemoryTier::Expired);
    }

    #[test]
    fn tier_names_round_trip_through_parse() {
        for tier in MemoryTier::ALL {
            assert_eq!(MemoryTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(MemoryTier::parse("frozen"), None);
    }

    #[test]
    fn tier_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&MemoryTier::Archived).unwrap();
        assert_eq!(json, "\"ARCHIVED\"");
    }
}
