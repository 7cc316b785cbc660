//! Error types for busysync.

use thiserror::Error;

use crate::preflight::PreflightCheck;

/// Errors that can occur while reconciling two calendars.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pass aborted: {} preflight check(s) failed", failed_count(.0))]
    Aborted(Vec<PreflightCheck>),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn failed_count(checks: &[PreflightCheck]) -> usize {
    checks.iter().filter(|c| !c.ok).count()
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::StateStore(err.to_string())
    }
}

impl SyncError {
    /// Whether this error only concerns a single event, so the pass may continue.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            SyncError::Rejected(_) | SyncError::NotFound(_) | SyncError::IcsParse(_)
        )
    }
}

/// Result type alias for busysync operations.
pub type SyncResult<T> = Result<T, SyncError>;
