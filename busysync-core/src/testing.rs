//! In-memory backend used by the engine tests.
//!
//! It behaves like the awkward providers the engine has to cope with: it can
//! hand back different uids than it was given, rewrites bookkeeping
//! properties on every read, and refuses individual events on request.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use crate::backend::{CalendarBackend, CalendarInfo};
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventKey, RecurrenceKey};

#[derive(Default)]
struct State {
    calendars: BTreeMap<String, Vec<Event>>,
    read_only: HashSet<String>,
    rejected_titles: HashSet<String>,
    empty_series: HashSet<String>,
    unreachable: bool,
    offline_after: Option<usize>,
    rewrite_uids: bool,
    next_id: u64,
    clock: u64,
    writes: usize,
}

impl State {
    fn tick(&mut self) -> String {
        self.clock += 1;
        format!("20260101T{:06}Z", self.clock)
    }

    fn calendar_mut(&mut self, calendar_id: &str) -> SyncResult<&mut Vec<Event>> {
        self.calendars
            .get_mut(calendar_id)
            .ok_or_else(|| SyncError::NotFound(format!("calendar '{}'", calendar_id)))
    }

    fn check_write(&mut self, calendar_id: &str, event: Option<&Event>) -> SyncResult<()> {
        if self.offline_after.is_some_and(|limit| self.writes >= limit) {
            self.unreachable = true;
        }
        if self.unreachable {
            return Err(SyncError::Unreachable("memory backend offline".into()));
        }
        self.writes += 1;
        if self.read_only.contains(calendar_id) {
            return Err(SyncError::Rejected(format!("calendar '{}' is read-only", calendar_id)));
        }
        if let Some(event) = event.filter(|e| self.rejected_titles.contains(e.summary())) {
            return Err(SyncError::Rejected(format!("refusing '{}'", event.summary())));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    state: RefCell<State>,
}

impl MemoryBackend {
    pub fn with_calendars(ids: &[&str]) -> Self {
        let backend = MemoryBackend::default();
        {
            let mut state = backend.state.borrow_mut();
            for id in ids {
                state.calendars.insert((*id).to_string(), Vec::new());
            }
        }
        backend
    }

    /// Assign server-side uids on create instead of keeping the caller's.
    pub fn rewriting_uids(self) -> Self {
        self.state.borrow_mut().rewrite_uids = true;
        self
    }

    pub fn set_read_only(&self, calendar_id: &str) {
        self.state.borrow_mut().read_only.insert(calendar_id.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.borrow_mut();
        state.unreachable = unreachable;
        state.offline_after = None;
    }

    /// Drop off the network once `writes` write calls have been made.
    pub fn go_offline_after(&self, writes: usize) {
        let mut state = self.state.borrow_mut();
        state.offline_after = Some(state.writes + writes);
    }

    pub fn reject_title(&self, title: &str) {
        self.state.borrow_mut().rejected_titles.insert(title.to_string());
    }

    /// Report the series with this uid as producing no occurrences.
    pub fn mark_empty_series(&self, uid: &str) {
        self.state.borrow_mut().empty_series.insert(uid.to_string());
    }

    /// Put an event straight into a calendar, as a user would.
    pub fn insert(&self, calendar_id: &str, event: Event) {
        let mut state = self.state.borrow_mut();
        state
            .calendars
            .entry(calendar_id.to_string())
            .or_default()
            .push(event);
    }

    /// Edit an event in place, as a user would.
    pub fn edit(&self, calendar_id: &str, key: &EventKey, f: impl FnOnce(&mut Event)) {
        let mut state = self.state.borrow_mut();
        if let Some(event) = state
            .calendars
            .get_mut(calendar_id)
            .and_then(|events| events.iter_mut().find(|e| e.key() == *key))
        {
            f(event);
        }
    }

    /// Remove an event directly, as a user would.
    pub fn remove(&self, calendar_id: &str, key: &EventKey) {
        let mut state = self.state.borrow_mut();
        if let Some(events) = state.calendars.get_mut(calendar_id) {
            events.retain(|e| e.key() != *key);
        }
    }

    pub fn events(&self, calendar_id: &str) -> Vec<Event> {
        self.state
            .borrow()
            .calendars
            .get(calendar_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find(&self, calendar_id: &str, key: &EventKey) -> Option<Event> {
        self.events(calendar_id).into_iter().find(|e| e.key() == *key)
    }

    /// Number of write calls attempted so far, failed ones included.
    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }
}

impl CalendarBackend for MemoryBackend {
    fn ping(&self) -> SyncResult<()> {
        if self.state.borrow().unreachable {
            return Err(SyncError::Unreachable("memory backend offline".into()));
        }
        Ok(())
    }

    fn calendar_info(&self, calendar_id: &str) -> SyncResult<CalendarInfo> {
        self.ping()?;
        if !self.state.borrow().calendars.contains_key(calendar_id) {
            return Err(SyncError::NotFound(format!("calendar '{}'", calendar_id)));
        }
        Ok(CalendarInfo {
            id: calendar_id.to_string(),
            display_name: calendar_id.to_string(),
        })
    }

    fn list(&self, calendar_id: &str) -> SyncResult<Vec<Event>> {
        self.ping()?;
        let mut state = self.state.borrow_mut();
        let stamp = state.tick();
        let events = state.calendar_mut(calendar_id)?.clone();

        Ok(events
            .into_iter()
            .map(|mut e| {
                e.set("DTSTAMP", stamp.clone());
                e
            })
            .collect())
    }

    fn create(&self, calendar_id: &str, event: &Event) -> SyncResult<(String, Event)> {
        let mut state = self.state.borrow_mut();
        state.check_write(calendar_id, Some(event))?;

        let uid = if state.rewrite_uids {
            state.next_id += 1;
            format!("srv-{}", state.next_id)
        } else {
            event.uid.clone()
        };

        let mut stored = event.clone();
        stored.uid = uid.clone();
        let stamp = state.tick();
        stored.set("LAST-MODIFIED", stamp.clone());
        stored.set("CREATED", stamp);
        stored.set("SEQUENCE", "0");

        state.calendar_mut(calendar_id)?.push(stored.clone());
        Ok((uid, stored))
    }

    fn modify(
        &self,
        calendar_id: &str,
        uid: &str,
        recurrence_key: Option<&RecurrenceKey>,
        event: &Event,
    ) -> SyncResult<Event> {
        let mut state = self.state.borrow_mut();
        state.check_write(calendar_id, Some(event))?;
        let stamp = state.tick();

        let key = EventKey::new(uid, recurrence_key.cloned());
        let existing = state
            .calendar_mut(calendar_id)?
            .iter_mut()
            .find(|e| e.key() == key)
            .ok_or_else(|| SyncError::NotFound(format!("event '{}'", key)))?;

        let sequence = existing
            .value("SEQUENCE")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let mut stored = event.clone();
        stored.uid = existing.uid.clone();
        stored.recurrence_key = existing.recurrence_key.clone();
        stored.set("LAST-MODIFIED", stamp);
        stored.set("SEQUENCE", (sequence + 1).to_string());

        *existing = stored.clone();
        Ok(stored)
    }

    fn delete(
        &self,
        calendar_id: &str,
        uid: &str,
        recurrence_key: Option<&RecurrenceKey>,
    ) -> SyncResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_write(calendar_id, None)?;

        let key = EventKey::new(uid, recurrence_key.cloned());
        let events = state.calendar_mut(calendar_id)?;
        let before = events.len();
        events.retain(|e| e.key() != key);
        if events.len() == before {
            return Err(SyncError::NotFound(format!("event '{}'", key)));
        }
        Ok(())
    }

    fn is_writable(&self, calendar_id: &str) -> SyncResult<bool> {
        self.calendar_info(calendar_id)?;
        Ok(!self.state.borrow().read_only.contains(calendar_id))
    }

    fn has_occurrences(&self, event: &Event) -> bool {
        !self.state.borrow().empty_series.contains(&event.uid)
    }
}
