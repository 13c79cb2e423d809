//! Schema-less document representation and defensive field accessors.
//!
//! Every field of a stored document is treated as optional. Accessors return
//! `None` for absent fields as well as for fields holding an unexpected type,
//! so callers can chain historical aliases with `or_else`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// A document read from the store: its store-assigned id plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builds a document from a JSON object literal. Non-object values yield an
    /// empty field map.
    pub fn from_value(id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self::new(id, fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Non-empty string field.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Owned variant of [`Document::str`].
    pub fn string(&self, field: &str) -> Option<String> {
        self.str(field).map(str::to_string)
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Numeric field. Numeric strings are accepted because several emitters
    /// wrote coordinates as text.
    pub fn f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(value_as_f64)
    }

    /// Array of strings; non-string entries are skipped.
    pub fn str_array(&self, field: &str) -> Option<Vec<String>> {
        self.get(field).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }

    pub fn object(&self, field: &str) -> Option<&Fields> {
        self.get(field).and_then(Value::as_object)
    }

    pub fn array(&self, field: &str) -> Option<&Vec<Value>> {
        self.get(field).and_then(Value::as_array)
    }
}

/// Reads a JSON value as `f64`, accepting numbers and numeric strings.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Reads a string entry from a nested object.
pub fn nested_str<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Reads a numeric entry from a nested object.
pub fn nested_f64(fields: &Fields, key: &str) -> Option<f64> {
    fields.get(key).and_then(value_as_f64)
}
