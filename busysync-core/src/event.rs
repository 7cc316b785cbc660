//! Backend-neutral event representation.
//!
//! An event is kept as a list of iCalendar properties rather than typed fields,
//! so whatever a backend hands us survives a trip through the engine untouched.
//! Only the identity (UID and RECURRENCE-ID) is lifted into dedicated fields.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Separator between the UID and the recurrence key in a compound key.
const RID_SEPARATOR: &str = "::RID::";

/// A single iCalendar property (`NAME;PARAM=VALUE:value`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Upper-cased property name
    pub name: String,
    pub params: Vec<(String, String)>,
    /// Raw (still escaped) property value
    pub value: String,
}

impl Property {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Property {
            name: name.to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_ascii_uppercase(), value.into()));
        self
    }

    /// Look up a parameter value, case-insensitively.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A nested component such as a VALARM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Component {
    pub fn new(name: &str) -> Self {
        Component {
            name: name.to_ascii_uppercase(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.is(name))
    }
}

/// Identifies one occurrence of a recurring series.
///
/// The value is normalized (`-` and `:` dropped, upper-cased) so that
/// `2026-01-01` and `20260101` compare equal. Parameters such as TZID are kept
/// only so the key can be written back out; they take no part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceKey {
    value: String,
    params: Vec<(String, String)>,
}

impl RecurrenceKey {
    pub fn new(raw: &str) -> Self {
        Self::with_params(raw, Vec::new())
    }

    pub fn with_params(raw: &str, params: Vec<(String, String)>) -> Self {
        let value = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | ':'))
            .collect::<String>()
            .to_ascii_uppercase();
        RecurrenceKey { value, params }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The `YYYYMMDD` part of the key.
    pub fn date_part(&self) -> &str {
        self.value.get(..8).unwrap_or(&self.value)
    }
}

impl PartialEq for RecurrenceKey {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for RecurrenceKey {}

impl Hash for RecurrenceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Display for RecurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Identity of a logical occurrence within one calendar: `(uid, recurrence_key)`.
///
/// Renders as the compound key stored in the state store: the bare UID for
/// masters, `uid::RID::<recurrence key>` for overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub uid: String,
    pub recurrence_key: Option<RecurrenceKey>,
}

impl EventKey {
    pub fn new(uid: impl Into<String>, recurrence_key: Option<RecurrenceKey>) -> Self {
        EventKey {
            uid: uid.into(),
            recurrence_key,
        }
    }

    /// Parse a compound key produced by `Display`.
    pub fn parse(compound: &str) -> Self {
        match compound.split_once(RID_SEPARATOR) {
            Some((uid, rid)) => EventKey::new(uid, Some(RecurrenceKey::new(rid))),
            None => EventKey::new(compound, None),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recurrence_key {
            Some(rid) => write!(f, "{}{}{}", self.uid, RID_SEPARATOR, rid),
            None => write!(f, "{}", self.uid),
        }
    }
}

/// A calendar event as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    /// Set for overrides of a single occurrence, absent for masters
    pub recurrence_key: Option<RecurrenceKey>,
    /// Everything except UID and RECURRENCE-ID, in backend order
    pub properties: Vec<Property>,
    /// Nested components (reminders)
    pub subcomponents: Vec<Component>,
}

impl Event {
    pub fn new(uid: impl Into<String>) -> Self {
        Event {
            uid: uid.into(),
            recurrence_key: None,
            properties: Vec::new(),
            subcomponents: Vec::new(),
        }
    }

    /// Builder-style property append.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_recurrence_key(mut self, key: RecurrenceKey) -> Self {
        self.recurrence_key = Some(key);
        self
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.subcomponents.push(component);
        self
    }

    pub fn key(&self) -> EventKey {
        EventKey::new(self.uid.clone(), self.recurrence_key.clone())
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.is(name))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties.iter().filter(move |p| p.is(name))
    }

    /// Replace every occurrence of `name` with a single property.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove_all(name);
        self.properties.push(Property::new(name, value));
    }

    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// Remove every property called `name`, returning how many were dropped.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.properties.len();
        self.properties.retain(|p| !p.is(name));
        before - self.properties.len()
    }

    pub fn summary(&self) -> &str {
        self.value("SUMMARY").unwrap_or("(No title)")
    }

    /// All CATEGORIES values, with comma-joined lists split apart.
    ///
    /// Some backends merge repeated CATEGORIES properties into one, so markers
    /// must be looked up across both shapes.
    pub fn categories(&self) -> Vec<&str> {
        self.get_all("CATEGORIES")
            .flat_map(|p| p.value.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }

    pub fn is_recurring(&self) -> bool {
        self.get("RRULE").is_some() || self.get("RDATE").is_some()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
