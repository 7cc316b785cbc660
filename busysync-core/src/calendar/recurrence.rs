//! RRULE expansion for the directory backend.

use rrule::RRuleSet;
use tracing::debug;

use crate::event::{Event, Property};

/// Whether a series still yields at least one occurrence once its EXDATEs
/// are applied. Single events always count as occurring, and so do series
/// that cannot be expanded.
pub fn has_occurrences(event: &Event) -> bool {
    if !event.is_recurring() {
        return true;
    }
    let Some(dtstart) = event.get("DTSTART") else {
        return true;
    };

    let mut lines = vec![time_line("DTSTART", dtstart, &dtstart.value)];
    match event.value("RRULE") {
        Some(rrule) => lines.push(format!("RRULE:{}", rrule)),
        // Without a rule DTSTART is the first instance of the set
        None => lines.push(time_line("RDATE", dtstart, &dtstart.value)),
    }
    for (name, prop) in event
        .get_all("RDATE")
        .map(|p| ("RDATE", p))
        .chain(event.get_all("EXDATE").map(|p| ("EXDATE", p)))
    {
        for value in prop.value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            lines.push(time_line(name, prop, value));
        }
    }

    let rrule_set: RRuleSet = match lines.join("\n").parse() {
        Ok(set) => set,
        Err(e) => {
            debug!(uid = %event.uid, error = %e, "cannot expand recurrence, assuming it occurs");
            return true;
        }
    };

    !rrule_set.all(1).dates.is_empty()
}

/// One DTSTART/RDATE/EXDATE line in the form the rrule parser accepts.
///
/// The parser needs date-times, so all-day dates become midnight UTC and
/// floating times are read as UTC.
fn time_line(name: &str, prop: &Property, value: &str) -> String {
    if value.len() == 8 {
        return format!("{}:{}T000000Z", name, value);
    }
    if value.ends_with('Z') {
        return format!("{}:{}", name, value);
    }
    match prop.param("TZID") {
        Some(tzid) => format!("{};TZID={}:{}", name, tzid, value),
        None => format!("{}:{}Z", name, value),
    }
}
