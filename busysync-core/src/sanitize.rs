//! Privacy transform applied to every event before it is written to the other side.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{Event, EventKey, Property};
use crate::fingerprint::source_digest;

/// Category carried by every event this engine creates.
pub const MANAGED_MARKER: &str = "CALENDAR-SYNC-MANAGED";

/// Prefix of the category linking a mirror back to its source event.
pub const SOURCE_MARKER_PREFIX: &str = "CALENDAR-SYNC-SRC-";

/// Title written in redacted mode.
pub const REDACTED_TITLE: &str = "Busy";

/// Properties that never leave the source calendar.
const STRIPPED_PROPERTIES: &[&str] = &[
    "DESCRIPTION",
    "LOCATION",
    "ATTACH",
    "URL",
    "CONFERENCE",
    "ORGANIZER",
    "ATTENDEE",
    "STATUS",
    "CATEGORIES",
    "CLASS",
];

/// How the title is carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleMode {
    Verbatim,
    Redacted,
}

impl fmt::Display for TitleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleMode::Verbatim => write!(f, "verbatim"),
            TitleMode::Redacted => write!(f, "redacted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    pub mode: TitleMode,
    pub keep_reminders: bool,
}

impl SanitizeOptions {
    pub fn new(mode: TitleMode) -> Self {
        SanitizeOptions {
            mode,
            keep_reminders: false,
        }
    }
}

/// Sanitize `event` under a freshly generated UID.
pub fn sanitize(event: &Event, options: &SanitizeOptions) -> Event {
    sanitize_with_uid(event, options, Uuid::new_v4().to_string())
}

/// Deterministic form of [`sanitize`]: the caller chooses the output UID.
pub fn sanitize_with_uid(event: &Event, options: &SanitizeOptions, uid: String) -> Event {
    let source_marker = source_marker(&event.key());

    let mut properties: Vec<Property> = event
        .properties
        .iter()
        .filter(|p| !is_stripped(&p.name))
        .cloned()
        .collect();

    if options.mode == TitleMode::Redacted {
        properties.retain(|p| !p.is("SUMMARY"));
        properties.push(Property::new("SUMMARY", REDACTED_TITLE));
    }

    normalize_date_exdates(&mut properties);

    properties.push(Property::new("CLASS", "PRIVATE"));
    properties.push(Property::new("CATEGORIES", MANAGED_MARKER));
    properties.push(Property::new("CATEGORIES", source_marker));

    let subcomponents = if options.keep_reminders {
        event
            .subcomponents
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case("VALARM"))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    Event {
        uid,
        // Destination may not hold the master series, so overrides land as standalone events
        recurrence_key: None,
        properties,
        subcomponents,
    }
}

/// Marker category for the source identified by `source_key`.
pub fn source_marker(source_key: &EventKey) -> String {
    format!("{}{}", SOURCE_MARKER_PREFIX, source_digest(source_key))
}

/// Whether the event was created by this engine.
pub fn is_managed(event: &Event) -> bool {
    event.has_category(MANAGED_MARKER)
}

/// The source digest carried by a managed event, if any.
pub fn source_marker_digest(event: &Event) -> Option<String> {
    event.categories().into_iter().find_map(|c| {
        c.get(..SOURCE_MARKER_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(SOURCE_MARKER_PREFIX))
            .map(|_| c[SOURCE_MARKER_PREFIX.len()..].to_ascii_lowercase())
    })
}

fn is_stripped(name: &str) -> bool {
    name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("X-"))
        || STRIPPED_PROPERTIES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name))
}

/// Rewrite `EXDATE;VALUE=DATE` values as TZID date-times at the series' start time.
///
/// Backends compare exclusions against occurrence start instants, so a bare
/// date never matches a timed series and the occurrence stays visible.
fn normalize_date_exdates(properties: &mut [Property]) {
    let Some((tzid, time)) = properties.iter().find(|p| p.is("DTSTART")).and_then(|p| {
        let tzid = p.param("TZID")?.to_string();
        let (_, time) = p.value.split_once('T')?;
        Some((tzid, time.to_string()))
    }) else {
        return;
    };

    for prop in properties.iter_mut().filter(|p| p.is("EXDATE")) {
        let is_date = prop
            .param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
            || (prop.value.len() == 8 && prop.value.chars().all(|c| c.is_ascii_digit()));
        if !is_date {
            continue;
        }

        let value = prop
            .value
            .split(',')
            .map(|d| format!("{}T{}", d.trim(), time))
            .collect::<Vec<_>>()
            .join(",");

        *prop = Property::new("EXDATE", value).with_param("TZID", tzid.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Component, RecurrenceKey};

    fn meeting() -> Event {
        Event::new("work-123")
            .with("SUMMARY", "Quarterly review with ACME")
            .with("DESCRIPTION", "Dial-in: 555-1234")
            .with("LOCATION", "Board room")
            .with("URL", "https://meet.example.com/abc")
            .with("ORGANIZER", "mailto:boss@example.com")
            .with("ATTENDEE", "mailto:me@example.com")
            .with("ATTACH", "https://files.example.com/deck.pdf")
            .with("STATUS", "CONFIRMED")
            .with("CATEGORIES", "Clients")
            .with("CLASS", "PUBLIC")
            .with("X-MS-OLK-CONFTYPE", "0")
            .with("DTSTART", "20260105T090000Z")
            .with("DTEND", "20260105T100000Z")
            .with_component(
                Component::new("VALARM")
                    .with("ACTION", "DISPLAY")
                    .with("TRIGGER", "-PT15M"),
            )
    }

    #[test]
    fn test_verbatim_keeps_title_and_strips_details() {
        let out = sanitize(&meeting(), &SanitizeOptions::new(TitleMode::Verbatim));

        assert_eq!(out.summary(), "Quarterly review with ACME");
        for name in [
            "DESCRIPTION", "LOCATION", "URL", "ORGANIZER", "ATTENDEE", "ATTACH", "STATUS",
            "X-MS-OLK-CONFTYPE",
        ] {
            assert!(out.get(name).is_none(), "{} should be stripped", name);
        }
        assert_eq!(out.value("DTSTART"), Some("20260105T090000Z"));
        assert_eq!(out.value("DTEND"), Some("20260105T100000Z"));
        assert_eq!(out.value("CLASS"), Some("PRIVATE"));
        assert!(out.subcomponents.is_empty());
        assert!(!out.has_category("Clients"));
    }

    #[test]
    fn test_redacted_replaces_title() {
        let out = sanitize(&meeting(), &SanitizeOptions::new(TitleMode::Redacted));
        assert_eq!(out.summary(), REDACTED_TITLE);
        assert_eq!(out.get_all("SUMMARY").count(), 1);
    }

    #[test]
    fn test_markers_and_fresh_uid() {
        let source = meeting();
        let options = SanitizeOptions::new(TitleMode::Verbatim);
        let a = sanitize(&source, &options);
        let b = sanitize(&source, &options);

        assert_ne!(a.uid, source.uid);
        assert_ne!(a.uid, b.uid);
        assert!(is_managed(&a));
        assert_eq!(
            source_marker_digest(&a),
            Some(source_digest(&source.key())),
        );
        assert_eq!(source_marker_digest(&a), source_marker_digest(&b));
        assert!(!is_managed(&source));
    }

    #[test]
    fn test_sanitize_with_uid_is_deterministic() {
        let options = SanitizeOptions::new(TitleMode::Redacted);
        let a = sanitize_with_uid(&meeting(), &options, "fixed".to_string());
        let b = sanitize_with_uid(&meeting(), &options, "fixed".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_override_becomes_standalone() {
        let over = meeting().with_recurrence_key(RecurrenceKey::new("20260105T090000Z"));
        let out = sanitize(&over, &SanitizeOptions::new(TitleMode::Verbatim));

        assert!(out.recurrence_key.is_none());
        assert_ne!(
            source_marker_digest(&out),
            source_marker_digest(&sanitize(&meeting(), &SanitizeOptions::new(TitleMode::Verbatim))),
            "override and master must carry different source markers"
        );
    }

    #[test]
    fn test_keep_reminders() {
        let options = SanitizeOptions {
            mode: TitleMode::Verbatim,
            keep_reminders: true,
        };
        let out = sanitize(&meeting(), &options);
        assert_eq!(out.subcomponents.len(), 1);
        assert_eq!(out.subcomponents[0].name, "VALARM");
    }

    #[test]
    fn test_date_exdates_are_normalized_to_tzid() {
        let series = Event::new("series")
            .with_property(
                Property::new("DTSTART", "20260105T090000").with_param("TZID", "Europe/Berlin"),
            )
            .with("RRULE", "FREQ=WEEKLY")
            .with_property(Property::new("EXDATE", "20260112,20260119").with_param("VALUE", "DATE"))
            .with_property(
                Property::new("EXDATE", "20260126T090000").with_param("TZID", "Europe/Berlin"),
            );

        let out = sanitize(&series, &SanitizeOptions::new(TitleMode::Verbatim));
        let exdates: Vec<_> = out.get_all("EXDATE").collect();

        assert_eq!(exdates.len(), 2);
        assert_eq!(exdates[0].value, "20260112T090000,20260119T090000");
        assert_eq!(exdates[0].param("TZID"), Some("Europe/Berlin"));
        assert_eq!(exdates[0].param("VALUE"), None);
        assert_eq!(exdates[1].value, "20260126T090000");
    }

    #[test]
    fn test_floating_series_leaves_date_exdates_alone() {
        let series = Event::new("series")
            .with("DTSTART", "20260105")
            .with_property(Property::new("EXDATE", "20260112").with_param("VALUE", "DATE"));

        let out = sanitize(&series, &SanitizeOptions::new(TitleMode::Verbatim));
        assert_eq!(out.value("EXDATE"), Some("20260112"));
    }
}
