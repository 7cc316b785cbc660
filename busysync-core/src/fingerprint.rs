//! Content fingerprints used for change detection.
//!
//! Backends rewrite a handful of bookkeeping properties on every read, so those
//! are dropped before hashing. What remains is serialized with a stable
//! property order and hashed with SHA-256.

use sha2::{Digest, Sha256};

use crate::event::{Component, Event, EventKey, Property};
use crate::ics::content_line;

/// Properties a backend may rewrite without any real change to the event.
pub const VOLATILE_PROPERTIES: &[&str] = &["DTSTAMP", "LAST-MODIFIED", "CREATED", "SEQUENCE"];

/// Length of the source digest embedded in the orphan-recovery marker.
pub const SOURCE_DIGEST_LEN: usize = 16;

pub fn is_volatile(name: &str) -> bool {
    VOLATILE_PROPERTIES
        .iter()
        .any(|v| v.eq_ignore_ascii_case(name))
}

/// Copy of `event` with every volatile property removed, at any depth.
pub fn strip_volatile(event: &Event) -> Event {
    Event {
        uid: event.uid.clone(),
        recurrence_key: event.recurrence_key.clone(),
        properties: stable_properties(&event.properties),
        subcomponents: event.subcomponents.iter().map(strip_component).collect(),
    }
}

fn strip_component(component: &Component) -> Component {
    Component {
        name: component.name.clone(),
        properties: stable_properties(&component.properties),
        components: component.components.iter().map(strip_component).collect(),
    }
}

fn stable_properties(properties: &[Property]) -> Vec<Property> {
    properties
        .iter()
        .filter(|p| !is_volatile(&p.name))
        .cloned()
        .collect()
}

/// Hex-encoded SHA-256 over the canonical form of `event`.
pub fn fingerprint(event: &Event) -> String {
    hex::encode(Sha256::digest(canonical_form(event).as_bytes()))
}

/// Short digest of a source event's compound key, carried by its mirror.
pub fn source_digest(key: &EventKey) -> String {
    let mut digest = hex::encode(Sha256::digest(key.to_string().as_bytes()));
    digest.truncate(SOURCE_DIGEST_LEN);
    digest
}

fn canonical_form(event: &Event) -> String {
    let mut lines = vec![format!("UID:{}", event.uid)];
    if let Some(rid) = &event.recurrence_key {
        lines.push(format!("RECURRENCE-ID:{}", rid));
    }
    lines.extend(canonical_lines(&event.properties, &event.subcomponents));
    lines.join("\n")
}

fn canonical_lines(properties: &[Property], components: &[Component]) -> Vec<String> {
    let mut lines: Vec<String> = properties
        .iter()
        .filter(|p| !is_volatile(&p.name))
        .map(|p| {
            let mut p = p.clone();
            p.params.sort();
            content_line(&p)
        })
        .collect();
    lines.sort();

    let mut blocks: Vec<String> = components
        .iter()
        .map(|c| {
            let mut block = vec![format!("BEGIN:{}", c.name)];
            block.extend(canonical_lines(&c.properties, &c.components));
            block.push(format!("END:{}", c.name));
            block.join("\n")
        })
        .collect();
    blocks.sort();

    lines.extend(blocks);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecurrenceKey;
    use proptest::prelude::*;

    fn sample() -> Event {
        Event::new("evt-1")
            .with("SUMMARY", "Team Sync")
            .with("DTSTART", "20260105T090000Z")
            .with("DTEND", "20260105T100000Z")
            .with("DTSTAMP", "20260101T000000Z")
            .with("SEQUENCE", "3")
    }

    #[test]
    fn test_volatile_properties_do_not_change_digest() {
        let mut rewritten = sample();
        rewritten.set("DTSTAMP", "20261231T235959Z");
        rewritten.set("SEQUENCE", "9");
        rewritten.push(Property::new("LAST-MODIFIED", "20260201T000000Z"));
        rewritten.push(Property::new("created", "20250101T000000Z"));

        assert_eq!(fingerprint(&sample()), fingerprint(&rewritten));
        assert_eq!(fingerprint(&sample()), fingerprint(&strip_volatile(&sample())));
    }

    #[test]
    fn test_volatile_properties_inside_alarms_are_ignored() {
        let alarm = Component::new("VALARM")
            .with("ACTION", "DISPLAY")
            .with("TRIGGER", "-PT10M");
        let base = sample().with_component(alarm.clone());
        let stamped = sample().with_component(alarm.with("DTSTAMP", "20260303T000000Z"));

        assert_eq!(fingerprint(&base), fingerprint(&stamped));
    }

    #[test]
    fn test_identity_is_part_of_digest() {
        let master = sample();
        let over = sample().with_recurrence_key(RecurrenceKey::new("20260105T090000Z"));
        assert_ne!(fingerprint(&master), fingerprint(&over));
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = Event::new("p").with_property(
            Property::new("DTSTART", "20260105T090000")
                .with_param("TZID", "Europe/Berlin")
                .with_param("X-FOO", "1"),
        );
        let b = Event::new("p").with_property(
            Property::new("DTSTART", "20260105T090000")
                .with_param("X-FOO", "1")
                .with_param("TZID", "Europe/Berlin"),
        );
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_source_digest_is_short_and_deterministic() {
        let key = EventKey::new("X", Some(RecurrenceKey::new("20260101")));
        let digest = source_digest(&key);

        assert_eq!(digest.len(), SOURCE_DIGEST_LEN);
        assert_eq!(digest, source_digest(&EventKey::parse("X::RID::2026-01-01")));
        assert_ne!(digest, source_digest(&EventKey::new("X", None)));
    }

    const STABLE_NAMES: &[&str] = &[
        "SUMMARY", "DTSTART", "DTEND", "RRULE", "EXDATE", "CATEGORIES", "CLASS", "TRANSP",
    ];

    fn arb_property() -> impl Strategy<Value = Property> {
        (prop::sample::select(STABLE_NAMES), "[ -~]{0,20}")
            .prop_map(|(name, value)| Property::new(name, value))
    }

    fn arb_event() -> impl Strategy<Value = Event> {
        ("[a-z0-9-]{1,16}", prop::collection::vec(arb_property(), 1..8)).prop_map(
            |(uid, properties)| Event {
                uid,
                recurrence_key: None,
                properties,
                subcomponents: Vec::new(),
            },
        )
    }

    proptest! {
        #[test]
        fn prop_stripping_volatile_keeps_digest(
            event in arb_event(),
            stamps in prop::collection::vec(
                (prop::sample::select(VOLATILE_PROPERTIES), "[0-9TZ]{0,16}"),
                0..6,
            ),
        ) {
            let mut noisy = event.clone();
            for (name, value) in stamps {
                noisy.push(Property::new(name, value));
            }
            prop_assert_eq!(fingerprint(&noisy), fingerprint(&strip_volatile(&noisy)));
            prop_assert_eq!(fingerprint(&noisy), fingerprint(&event));
        }

        #[test]
        fn prop_reordering_keeps_digest(event in arb_event()) {
            let mut reversed = event.clone();
            reversed.properties.reverse();
            prop_assert_eq!(fingerprint(&event), fingerprint(&reversed));
        }

        #[test]
        fn prop_editing_a_property_changes_digest(
            event in arb_event(),
            index in any::<prop::sample::Index>(),
            suffix in "[ -~]{1,8}",
        ) {
            let mut edited = event.clone();
            let i = index.index(edited.properties.len());
            edited.properties[i].value.push_str(&suffix);
            prop_assert_ne!(fingerprint(&event), fingerprint(&edited));
        }
    }
}
