//! ICS file generation.

use crate::event::{Component, Event, Property};

/// Maximum line length in octets before folding (RFC 5545 section 3.1)
const FOLD_WIDTH: usize = 75;

/// Generate a VCALENDAR document holding the given events.
pub fn generate_ics(events: &[Event]) -> String {
    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, "PRODID:BUSYSYNC");

    for event in events {
        write_event(&mut out, event);
    }

    push_line(&mut out, "END:VCALENDAR");
    out
}

fn write_event(out: &mut String, event: &Event) {
    push_line(out, "BEGIN:VEVENT");
    push_line(out, &content_line(&Property::new("UID", event.uid.clone())));

    if let Some(rid) = &event.recurrence_key {
        let prop = Property {
            name: "RECURRENCE-ID".to_string(),
            params: rid.params().to_vec(),
            value: rid.as_str().to_string(),
        };
        push_line(out, &content_line(&prop));
    }

    for prop in &event.properties {
        push_line(out, &content_line(prop));
    }

    for component in &event.subcomponents {
        write_component(out, component);
    }

    push_line(out, "END:VEVENT");
}

fn write_component(out: &mut String, component: &Component) {
    push_line(out, &format!("BEGIN:{}", component.name));
    for prop in &component.properties {
        push_line(out, &content_line(prop));
    }
    for child in &component.components {
        write_component(out, child);
    }
    push_line(out, &format!("END:{}", component.name));
}

/// Render a property as an unfolded content line.
pub(crate) fn content_line(prop: &Property) -> String {
    let mut line = prop.name.clone();
    for (key, value) in &prop.params {
        line.push(';');
        line.push_str(key);
        line.push('=');
        if value.contains(&[':', ';', ','][..]) {
            line.push('"');
            line.push_str(value);
            line.push('"');
        } else {
            line.push_str(value);
        }
    }
    line.push(':');
    line.push_str(&prop.value);
    line
}

/// Append a content line, folding it at 75 octets without splitting a UTF-8 character.
fn push_line(out: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > FOLD_WIDTH {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push_str("\r\n");
}
