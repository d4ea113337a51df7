//! The opaque value dictionary the driver hands the overlays.
//!
//! Dataset ingestion (CSV parsing etc.) is out of scope; `overlay-driver`
//! constructs `Record`s in-code.

use std::collections::BTreeMap;

/// A scalar payload value. Stands in for "opaque value" — the core never
/// inspects these beyond storing and returning them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An opaque record: a string -> value mapping with one designated key
/// field. `BTreeMap` keeps field order deterministic for
/// debugging and for `Display`-based test fixtures.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Normalized form of `field`'s value: `lower(strip(title))`.
    /// Returns `None` if the field is absent or not a string.
    pub fn normalized_key_field(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::Str(s) => Some(crate::hash::normalize_key(s)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_key_field_strips_and_lowercases() {
        let rec = Record::new().with("title", "  Alpha Title ").with("id", 1i64);
        assert_eq!(rec.normalized_key_field("title").as_deref(), Some("alpha title"));
        assert_eq!(rec.normalized_key_field("id"), None);
        assert_eq!(rec.normalized_key_field("missing"), None);
    }
}
