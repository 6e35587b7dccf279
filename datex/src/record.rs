//! The ordered, named-field record flowing through a pipeline.
//!
//! A [`Record`] is the unit of exchange between readers, transforms and
//! writers. Field order is preserved (insertion order), values are arbitrary
//! JSON so nested arrays and objects come for free, and end-of-stream is
//! represented by the absence of a record rather than by a sentinel field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ordered mapping of field name to value.
///
/// Records are cheap to clone relative to the I/O around them; the engine
/// clones the source record once per transaction to seed the target record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing field map.
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builds a record from a JSON value, when it is an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a field as a string slice, if present and textual.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Returns a field rendered as display text.
    ///
    /// Non-string scalars are rendered with their JSON representation, so a
    /// numeric `42` yields `"42"`. Missing fields yield `None`.
    #[must_use]
    pub fn get_display(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Sets a field, replacing any existing value, and preserving the
    /// position of an existing field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Removes a field, returning its value if it was present.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Renames a field in place, keeping its value.
    ///
    /// Returns `false` when the source field does not exist. The renamed
    /// field moves to the end of the record.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.fields.remove(from) {
            Some(value) => {
                self.fields.insert(to.into(), value);
                true
            }
            None => false,
        }
    }

    /// Returns true when the field exists.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the record, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
