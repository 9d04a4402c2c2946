//! Structurally tagged values.
//!
//! Dates, datetimes and errors travel through JSON (globals, event payloads,
//! results) as plain objects carrying a marker key. A mapping is recognised as
//! one of these kinds purely by its shape, once, when it becomes a [`Value`].

use std::rc::Rc;

use super::{MapEntries, Value};

pub const DATE_MARKER: &str = "__hogDate__";
pub const DATETIME_MARKER: &str = "__hogDateTime__";
pub const ERROR_MARKER: &str = "__hogError__";

pub const DEFAULT_ERROR_KIND: &str = "Error";
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HogDate {
    pub year: i64,
    pub month: i64,
    pub day: i64,
}

impl HogDate {
    pub fn new(year: i64, month: i64, day: i64) -> Self {
        Self { year, month, day }
    }

    pub fn to_entries(&self) -> MapEntries {
        let mut map = MapEntries::with_capacity(4);
        map.insert(DATE_MARKER.to_string(), Value::Bool(true));
        map.insert("year".to_string(), Value::Int(self.year));
        map.insert("month".to_string(), Value::Int(self.month));
        map.insert("day".to_string(), Value::Int(self.day));
        map
    }
}

/// A point in time, stored as fractional unix seconds plus the zone it should
/// be rendered in.
#[derive(Debug, Clone, PartialEq)]
pub struct HogDateTime {
    pub dt: f64,
    pub zone: Rc<str>,
}

impl HogDateTime {
    pub fn new(dt: f64, zone: impl Into<Rc<str>>) -> Self {
        Self { dt, zone: zone.into() }
    }

    pub fn utc(dt: f64) -> Self {
        Self::new(dt, "UTC")
    }

    pub fn to_entries(&self) -> MapEntries {
        let mut map = MapEntries::with_capacity(3);
        map.insert(DATETIME_MARKER.to_string(), Value::Bool(true));
        map.insert("dt".to_string(), Value::Float(self.dt));
        map.insert("zone".to_string(), Value::Str(self.zone.clone()));
        map
    }
}

#[derive(Debug, Clone)]
pub struct HogError {
    pub kind: String,
    pub message: String,
    pub payload: Option<Value>,
}

impl HogError {
    /// Builds an error, falling back to the default kind and message when
    /// either is empty.
    pub fn new(kind: impl Into<String>, message: impl Into<String>, payload: Option<Value>) -> Self {
        let kind = kind.into();
        let message = message.into();
        Self {
            kind: if kind.is_empty() { DEFAULT_ERROR_KIND.to_string() } else { kind },
            message: if message.is_empty() {
                DEFAULT_ERROR_MESSAGE.to_string()
            } else {
                message
            },
            payload: payload.filter(|p| !p.is_null()),
        }
    }

    /// Like [`HogError::new`] but takes script values; falsy kind or message
    /// fall back to the defaults, other values are stringified.
    pub fn from_values(kind: Option<&Value>, message: Option<&Value>, payload: Option<&Value>) -> Self {
        let text = |v: Option<&Value>| match v {
            Some(v) if v.truthy() => v.to_string(),
            _ => String::new(),
        };
        Self::new(text(kind), text(message), payload.cloned())
    }

    pub fn to_entries(&self) -> MapEntries {
        let mut map = MapEntries::with_capacity(4);
        map.insert(ERROR_MARKER.to_string(), Value::Bool(true));
        map.insert("type".to_string(), Value::from(self.kind.as_str()));
        map.insert("message".to_string(), Value::from(self.message.as_str()));
        map.insert("payload".to_string(), self.payload.clone().unwrap_or_default());
        map
    }
}

impl PartialEq for HogError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.payload.as_ref().unwrap_or(&Value::Null) == other.payload.as_ref().unwrap_or(&Value::Null)
    }
}

fn int_field(entries: &MapEntries, key: &str) -> Option<i64> {
    match entries.get(key)? {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

/// Recognises the boxed kinds by their discriminator keys. Returns `None` when
/// the mapping is missing any key or a field has the wrong type.
pub(crate) fn detect(entries: &MapEntries) -> Option<Value> {
    if entries.get(ERROR_MARKER).is_some_and(Value::truthy) {
        let kind = entries.get("type")?.as_str()?;
        let message = entries.get("message")?.as_str()?;
        let payload = entries.get("payload").cloned();
        return Some(Value::Error(Rc::new(HogError::new(kind, message, payload))));
    }
    if entries.contains_key(DATETIME_MARKER) {
        let dt = entries.get("dt")?.as_f64()?;
        let zone = entries.get("zone")?.as_str()?;
        return Some(Value::DateTime(HogDateTime::new(dt, zone)));
    }
    if entries.contains_key(DATE_MARKER) {
        let year = int_field(entries, "year")?;
        let month = int_field(entries, "month")?;
        let day = int_field(entries, "day")?;
        return Some(Value::Date(HogDate::new(year, month, day)));
    }
    None
}
