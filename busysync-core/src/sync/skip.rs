//! Events that are never mirrored.
//!
//! These are detected up front rather than left for the destination to
//! reject, since not every backend rejects them and skipping is always correct.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::backend::CalendarBackend;
use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// STATUS:CANCELLED
    Cancelled,
    /// TRANSP:TRANSPARENT, the event does not block time
    Free,
    /// The configured account declined the invitation
    Declined,
    /// Override standing in for an occurrence the master excludes
    DeclinedOccurrence,
    /// Recurring series whose every occurrence is excluded
    NoOccurrences,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Cancelled => write!(f, "cancelled"),
            SkipReason::Free => write!(f, "free time"),
            SkipReason::Declined => write!(f, "declined"),
            SkipReason::DeclinedOccurrence => write!(f, "declined occurrence"),
            SkipReason::NoOccurrences => write!(f, "no remaining occurrences"),
        }
    }
}

/// Skip rules for the events of one calendar.
pub struct SkipPolicy<'a> {
    account_email: Option<&'a str>,
    /// Master uid -> excluded dates (YYYYMMDD)
    master_exdates: HashMap<String, HashSet<String>>,
    same_date_overrides_declined: bool,
}

impl<'a> SkipPolicy<'a> {
    pub fn new(events: &[Event], account_email: Option<&'a str>) -> Self {
        let master_exdates = events
            .iter()
            .filter(|e| e.recurrence_key.is_none())
            .filter_map(|e| {
                let dates: HashSet<String> = e
                    .get_all("EXDATE")
                    .flat_map(|p| p.value.split(','))
                    .filter_map(|v| v.trim().get(..8))
                    .map(str::to_string)
                    .collect();
                (!dates.is_empty()).then(|| (e.uid.clone(), dates))
            })
            .collect();

        SkipPolicy {
            account_email,
            master_exdates,
            same_date_overrides_declined: true,
        }
    }

    /// Treat an override on a date its master excludes as a real meeting
    /// rather than a declined occurrence. Used by bidirectional passes, where
    /// the override is mirrored on its own and carries that day's busy time.
    pub fn keeping_same_date_overrides(mut self) -> Self {
        self.same_date_overrides_declined = false;
        self
    }

    pub fn check(&self, event: &Event, backend: &dyn CalendarBackend) -> Option<SkipReason> {
        if event
            .value("STATUS")
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("CANCELLED"))
        {
            return Some(SkipReason::Cancelled);
        }

        if event
            .value("TRANSP")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("TRANSPARENT"))
        {
            return Some(SkipReason::Free);
        }

        if self.declined_by_account(event) {
            return Some(SkipReason::Declined);
        }

        if self.same_date_overrides_declined && self.is_declined_occurrence(event) {
            return Some(SkipReason::DeclinedOccurrence);
        }

        if event.is_recurring() && !backend.has_occurrences(event) {
            return Some(SkipReason::NoOccurrences);
        }

        None
    }

    fn declined_by_account(&self, event: &Event) -> bool {
        let Some(email) = self.account_email else {
            return false;
        };

        event.get_all("ATTENDEE").any(|attendee| {
            let address = attendee.value.trim();
            let address = address
                .get(..7)
                .filter(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
                .map_or(address, |_| &address[7..]);

            address.eq_ignore_ascii_case(email)
                && attendee
                    .param("PARTSTAT")
                    .is_some_and(|p| p.eq_ignore_ascii_case("DECLINED"))
        })
    }

    // Some servers record a declined occurrence twice: as an EXDATE on the
    // master and as an override on that same date. A moved occurrence has a
    // different start date and is kept.
    fn is_declined_occurrence(&self, event: &Event) -> bool {
        let Some(rid) = &event.recurrence_key else {
            return false;
        };
        let Some(excluded) = self.master_exdates.get(&event.uid) else {
            return false;
        };

        let rid_date = rid.date_part();
        excluded.contains(rid_date)
            && event
                .value("DTSTART")
                .and_then(|v| v.get(..8))
                .is_some_and(|start| start == rid_date)
    }
}
