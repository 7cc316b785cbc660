//! The calendar backend port.
//!
//! The engine only ever talks to calendars through [`CalendarBackend`].
//! Adapters for concrete providers live behind it; the reconciler never learns
//! which provider it is talking to.

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::event::{Event, RecurrenceKey};

/// What a backend knows about one calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub display_name: String,
}

/// CRUD access to calendars held by one provider.
///
/// Every operation may fail with [`SyncError::Rejected`](crate::SyncError::Rejected)
/// for provider-specific reasons. Callers must never assume atomicity across
/// several calls.
pub trait CalendarBackend {
    /// Check that the provider itself can be reached.
    fn ping(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Resolve a calendar id. Fails with `NotFound` for unknown ids.
    fn calendar_info(&self, calendar_id: &str) -> SyncResult<CalendarInfo>;

    /// Every event currently in the calendar, overrides included.
    fn list(&self, calendar_id: &str) -> SyncResult<Vec<Event>>;

    /// Store a new event and return the identity and content the backend actually kept.
    ///
    /// The returned uid may differ from `event.uid`.
    fn create(&self, calendar_id: &str, event: &Event) -> SyncResult<(String, Event)>;

    /// Replace the content of an existing event and return what was stored.
    fn modify(
        &self,
        calendar_id: &str,
        uid: &str,
        recurrence_key: Option<&RecurrenceKey>,
        event: &Event,
    ) -> SyncResult<Event>;

    /// Remove an event. Fails with `NotFound` if it is already gone.
    fn delete(
        &self,
        calendar_id: &str,
        uid: &str,
        recurrence_key: Option<&RecurrenceKey>,
    ) -> SyncResult<()>;

    fn is_writable(&self, calendar_id: &str) -> SyncResult<bool>;

    /// Whether a recurring series still produces at least one occurrence.
    ///
    /// Recurrence expansion stays inside the adapter; the engine only consumes
    /// this answer.
    fn has_occurrences(&self, _event: &Event) -> bool {
        true
    }
}
