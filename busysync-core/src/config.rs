//! Engine configuration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::store::{Authority, PairId};

/// Which way events flow in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Both,
    ToSecondary,
    ToPrimary,
}

impl Direction {
    /// Authorities whose sources feed this direction.
    pub fn authorities(&self) -> &'static [Authority] {
        match self {
            Direction::Both => &[Authority::Primary, Authority::Secondary],
            Direction::ToSecondary => &[Authority::Primary],
            Direction::ToPrimary => &[Authority::Secondary],
        }
    }

    pub fn writes_primary(&self) -> bool {
        matches!(self, Direction::Both | Direction::ToPrimary)
    }

    pub fn writes_secondary(&self) -> bool {
        matches!(self, Direction::Both | Direction::ToSecondary)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Both => write!(f, "both"),
            Direction::ToSecondary => write!(f, "to-secondary"),
            Direction::ToPrimary => write!(f, "to-primary"),
        }
    }
}

/// Everything a pass needs, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub primary_calendar: String,
    pub secondary_calendar: String,
    pub state_db: PathBuf,
    pub direction: Direction,
    pub dry_run: bool,
    pub keep_reminders: bool,
    /// Address whose declined invitations are not mirrored
    pub account_email: Option<String>,
}

impl SyncConfig {
    pub fn new(
        primary_calendar: impl Into<String>,
        secondary_calendar: impl Into<String>,
        state_db: impl Into<PathBuf>,
    ) -> Self {
        SyncConfig {
            primary_calendar: primary_calendar.into(),
            secondary_calendar: secondary_calendar.into(),
            state_db: state_db.into(),
            direction: Direction::default(),
            dry_run: false,
            keep_reminders: false,
            account_email: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn pair(&self) -> PairId {
        PairId::new(self.primary_calendar.clone(), self.secondary_calendar.clone())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.primary_calendar.trim().is_empty() {
            return Err(SyncError::Config("Primary calendar id is empty".into()));
        }
        if self.secondary_calendar.trim().is_empty() {
            return Err(SyncError::Config("Secondary calendar id is empty".into()));
        }
        if self.primary_calendar == self.secondary_calendar {
            return Err(SyncError::Config(format!(
                "Cannot pair calendar '{}' with itself",
                self.primary_calendar
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_self_pairing() {
        let config = SyncConfig::new("work", "work", "/tmp/state.db");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        let config = SyncConfig::new("", "personal", "/tmp/state.db");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        assert!(SyncConfig::new("work", "personal", "/tmp/state.db").validate().is_ok());
    }

    #[test]
    fn test_direction_authorities() {
        assert_eq!(Direction::Both.authorities().len(), 2);
        assert_eq!(Direction::ToSecondary.authorities(), &[Authority::Primary]);
        assert!(Direction::ToPrimary.writes_primary());
        assert!(!Direction::ToPrimary.writes_secondary());
    }
}
