//! ICS parsing using the icalendar crate's parser.

use icalendar::parser::{Component as IcsComponent, Property as IcsProperty, read_calendar, unfold};

use crate::error::{SyncError, SyncResult};
use crate::event::{Component, Event, Property, RecurrenceKey};

/// Parse every VEVENT in an ICS document.
///
/// A single file may hold a recurring master together with its overrides, so
/// each VEVENT becomes its own [`Event`].
pub fn parse_events(content: &str) -> SyncResult<Vec<Event>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(SyncError::IcsParse)?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    vevents.into_iter().map(to_event).collect()
}

/// Parse an ICS document that is expected to hold exactly one event.
pub fn parse_event(content: &str) -> SyncResult<Event> {
    parse_events(content)?
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::IcsParse("No VEVENT found".to_string()))
}

// Some producers nest VEVENTs inside a VCALENDAR component rather than at the top level
fn collect_vevents<'a>(components: &'a [IcsComponent<'a>], out: &mut Vec<&'a IcsComponent<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else if component.name == "VCALENDAR" {
            collect_vevents(&component.components, out);
        }
    }
}

fn to_event(vevent: &IcsComponent) -> SyncResult<Event> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .ok_or_else(|| SyncError::IcsParse("VEVENT without UID".to_string()))?;

    let recurrence_key = vevent.find_prop("RECURRENCE-ID").map(|p| {
        let property = to_property(p);
        RecurrenceKey::with_params(&property.value, property.params)
    });

    let properties = vevent
        .properties
        .iter()
        .filter(|p| {
            let name = p.name.as_ref();
            !name.eq_ignore_ascii_case("UID") && !name.eq_ignore_ascii_case("RECURRENCE-ID")
        })
        .map(to_property)
        .collect();

    let subcomponents = vevent.components.iter().map(to_component).collect();

    Ok(Event {
        uid,
        recurrence_key,
        properties,
        subcomponents,
    })
}

fn to_component(component: &IcsComponent) -> Component {
    Component {
        name: component.name.as_ref().to_ascii_uppercase(),
        properties: component.properties.iter().map(to_property).collect(),
        components: component.components.iter().map(to_component).collect(),
    }
}

fn to_property(prop: &IcsProperty) -> Property {
    let params = prop
        .params
        .iter()
        .map(|p| {
            (
                p.key.as_ref().to_ascii_uppercase(),
                p.val.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            )
        })
        .collect();

    Property {
        name: prop.name.as_ref().to_ascii_uppercase(),
        params,
        value: prop.val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_master_and_override_from_one_file() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:standup-1\r\n\
SUMMARY:Standup\r\n\
DTSTART;TZID=Europe/Berlin:20260105T090000\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:standup-1\r\n\
RECURRENCE-ID;TZID=Europe/Berlin:20260112T090000\r\n\
SUMMARY:Standup (moved)\r\n\
DTSTART;TZID=Europe/Berlin:20260112T100000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let events = parse_events(ics).expect("Should parse");
        assert_eq!(events.len(), 2);

        let master = &events[0];
        assert_eq!(master.uid, "standup-1");
        assert!(master.recurrence_key.is_none());
        assert!(master.get("UID").is_none(), "UID lives in the uid field");

        let over = &events[1];
        let rid = over.recurrence_key.as_ref().expect("Should have recurrence key");
        assert_eq!(rid.as_str(), "20260112T090000");
        assert_eq!(rid.params(), &[("TZID".to_string(), "Europe/Berlin".to_string())]);
        assert_eq!(over.summary(), "Standup (moved)");
        assert_ne!(master.key(), over.key());
    }

    #[test]
    fn test_parse_keeps_params_and_alarms() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:test-123
SUMMARY:Dentist
DTSTART;TZID=America/New_York:20240108T100000
ATTENDEE;CN=Alice;PARTSTAT=DECLINED:mailto:alice@example.com
BEGIN:VALARM
ACTION:DISPLAY
TRIGGER:-PT15M
END:VALARM
END:VEVENT
END:VCALENDAR"#;

        let event = parse_event(ics).expect("Should parse");

        let dtstart = event.get("DTSTART").expect("Should have DTSTART");
        assert_eq!(dtstart.param("tzid"), Some("America/New_York"));
        assert_eq!(dtstart.value, "20240108T100000");

        let attendee = event.get("ATTENDEE").expect("Should have ATTENDEE");
        assert_eq!(attendee.param("PARTSTAT"), Some("DECLINED"));

        assert_eq!(event.subcomponents.len(), 1);
        assert_eq!(event.subcomponents[0].name, "VALARM");
        assert_eq!(
            event.subcomponents[0].find("TRIGGER").map(|p| p.value.as_str()),
            Some("-PT15M")
        );
    }

    #[test]
    fn test_parse_rejects_missing_uid() {
        let ics = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nSUMMARY:No id\nEND:VEVENT\nEND:VCALENDAR\n";
        assert!(matches!(parse_events(ics), Err(SyncError::IcsParse(_))));
    }

    #[test]
    fn test_parse_line_folding_preserves_whitespace() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:test-123\r\n\
SUMMARY:Test\r\n\
DESCRIPTION:Hello \r\n world and \r\n more text\r\n\
END:VEVENT\r\n\
END:VCALENDAR";

        let event = parse_event(ics).expect("Should parse");
        assert_eq!(event.value("DESCRIPTION"), Some("Hello world and more text"));
    }
}
