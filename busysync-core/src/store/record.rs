//! Rows of the state store and the values derived from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventKey;

/// The two calendars a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairId {
    pub primary: String,
    pub secondary: String,
}

impl PairId {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        PairId {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.primary, self.secondary)
    }
}

/// Which side's content wins for a tracked pair. Fixed when the record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    Primary,
    Secondary,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::Primary => "primary",
            Authority::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Authority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Authority::Primary),
            "secondary" => Ok(Authority::Secondary),
            other => Err(format!("unknown authority '{}'", other)),
        }
    }
}

/// One tracked source/mirror pair.
///
/// `primary_key` and `secondary_key` are compound keys (see [`EventKey`]) of
/// the event on each side. Which of them is the source depends on `authority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub pair: PairId,
    pub primary_key: String,
    pub secondary_key: String,
    pub primary_hash: String,
    pub secondary_hash: String,
    pub authority: Authority,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

impl SyncRecord {
    /// Build a record from the source/mirror point of view.
    pub fn new(
        pair: PairId,
        authority: Authority,
        source: &EventKey,
        mirror: &EventKey,
        source_hash: String,
        mirror_hash: String,
    ) -> Self {
        let now = Utc::now();
        let (primary_key, secondary_key, primary_hash, secondary_hash) = match authority {
            Authority::Primary => (source.to_string(), mirror.to_string(), source_hash, mirror_hash),
            Authority::Secondary => (mirror.to_string(), source.to_string(), mirror_hash, source_hash),
        };

        SyncRecord {
            pair,
            primary_key,
            secondary_key,
            primary_hash,
            secondary_hash,
            authority,
            created_at: now,
            last_synced_at: now,
        }
    }

    pub fn source_key(&self) -> EventKey {
        match self.authority {
            Authority::Primary => EventKey::parse(&self.primary_key),
            Authority::Secondary => EventKey::parse(&self.secondary_key),
        }
    }

    pub fn mirror_key(&self) -> EventKey {
        match self.authority {
            Authority::Primary => EventKey::parse(&self.secondary_key),
            Authority::Secondary => EventKey::parse(&self.primary_key),
        }
    }

    pub fn source_hash(&self) -> &str {
        match self.authority {
            Authority::Primary => &self.primary_hash,
            Authority::Secondary => &self.secondary_hash,
        }
    }

    pub fn mirror_hash(&self) -> &str {
        match self.authority {
            Authority::Primary => &self.secondary_hash,
            Authority::Secondary => &self.primary_hash,
        }
    }

    /// Same record pointing at a (possibly new) mirror, with fresh fingerprints.
    pub fn resynced(&self, mirror: &EventKey, source_hash: String, mirror_hash: String) -> Self {
        let mut next = SyncRecord::new(
            self.pair.clone(),
            self.authority,
            &self.source_key(),
            mirror,
            source_hash,
            mirror_hash,
        );
        next.created_at = self.created_at;
        next
    }
}

/// Per-pair summary of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairStatus {
    pub pair: PairId,
    pub primary_authority: usize,
    pub secondary_authority: usize,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl PairStatus {
    pub fn total(&self) -> usize {
        self.primary_authority + self.secondary_authority
    }
}

/// Which calendar column a migration rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrateScope {
    Primary,
    Secondary,
    Any,
}

impl MigrateScope {
    pub fn includes_primary(&self) -> bool {
        matches!(self, MigrateScope::Primary | MigrateScope::Any)
    }

    pub fn includes_secondary(&self) -> bool {
        matches!(self, MigrateScope::Secondary | MigrateScope::Any)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateResult {
    pub primary_rows: usize,
    pub secondary_rows: usize,
    pub dry_run: bool,
}

impl MigrateResult {
    pub fn total(&self) -> usize {
        self.primary_rows + self.secondary_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecurrenceKey;

    #[test]
    fn test_record_orients_keys_by_authority() {
        let pair = PairId::new("work", "personal");
        let source = EventKey::new("src", Some(RecurrenceKey::new("20260101")));
        let mirror = EventKey::new("mir", None);

        let forward = SyncRecord::new(
            pair.clone(),
            Authority::Primary,
            &source,
            &mirror,
            "s".into(),
            "m".into(),
        );
        assert_eq!(forward.primary_key, "src::RID::20260101");
        assert_eq!(forward.secondary_key, "mir");
        assert_eq!(forward.source_hash(), "s");

        let backward = SyncRecord::new(pair, Authority::Secondary, &source, &mirror, "s".into(), "m".into());
        assert_eq!(backward.primary_key, "mir");
        assert_eq!(backward.secondary_hash, "s");
        assert_eq!(backward.source_key(), source);
        assert_eq!(backward.mirror_key(), mirror);
    }

    #[test]
    fn test_resynced_keeps_created_at() {
        let pair = PairId::new("a", "b");
        let mut record = SyncRecord::new(
            pair,
            Authority::Primary,
            &EventKey::new("s", None),
            &EventKey::new("m1", None),
            "h1".into(),
            "h2".into(),
        );
        record.created_at = DateTime::from_timestamp(0, 0).unwrap_or_default();

        let next = record.resynced(&EventKey::new("m2", None), "h3".into(), "h4".into());
        assert_eq!(next.created_at, record.created_at);
        assert_eq!(next.secondary_key, "m2");
        assert_eq!(next.mirror_hash(), "h4");
    }

    #[test]
    fn test_authority_round_trip() {
        assert_eq!("primary".parse::<Authority>(), Ok(Authority::Primary));
        assert_eq!(Authority::Secondary.to_string(), "secondary");
        assert!("both".parse::<Authority>().is_err());
    }
}
