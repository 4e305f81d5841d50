use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Name of the identity field in every collection.
pub const ID_FIELD: &str = "_id";

/// Field stamped by `create(..., with_date = true)`.
pub const DATE_FIELD: &str = "date";

/// Flag consulted by `search(..., active_only = true)`.
pub const ACTIVE_FIELD: &str = "active";

/// A single field value inside a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Object(Record),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "string",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Object(_) => "object",
            FieldValue::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// JSON rendering; bytes become base64 text.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::Number((*i).into()),
            FieldValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Bytes(b) => Value::String(BASE64.encode(b)),
            FieldValue::Object(r) => r.to_json(),
            FieldValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => FieldValue::Object(Record::from(map)),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<Record> for FieldValue {
    fn from(value: Record) -> Self {
        FieldValue::Object(value)
    }
}

/// An insertion-ordered mapping of field name to value.
///
/// Re-inserting an existing field replaces its value in place, so field
/// order is the order in which names were first written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn id(&self) -> Option<&FieldValue> {
        self.get(ID_FIELD)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Copy of this record without the identity field.
    pub fn without_id(&self) -> Record {
        let mut copy = self.clone();
        copy.remove(ID_FIELD);
        copy
    }

    /// Overlay `other` onto this record, replacing fields present in both.
    pub fn merge(&mut self, other: &Record) {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
    }

    /// Stamp the current UTC time on [`DATE_FIELD`].
    pub fn stamp_date(&mut self) {
        self.insert(DATE_FIELD, chrono::Utc::now().to_rfc3339());
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Parse a JSON object into a record; anything else is rejected.
    pub fn from_json(value: Value) -> Option<Record> {
        match value {
            Value::Object(map) => Some(Record::from(map)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record {
            fields: map.into_iter().map(|(n, v)| (n, v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut rec = Record::new().with("a", 1).with("b", "two");
        rec.insert("a", 3);
        let names: Vec<&str> = rec.field_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(rec.get("a"), Some(&FieldValue::Int(3)));
    }

    #[test]
    fn test_json_conversion_keeps_order_and_types() {
        let rec = Record::from_json(json!({"z": 1, "a": 2.5, "m": {"k": true}, "n": null}))
            .unwrap();
        let names: Vec<&str> = rec.field_names().collect();
        assert_eq!(names, vec!["z", "a", "m", "n"]);
        assert_eq!(rec.get("z"), Some(&FieldValue::Int(1)));
        assert_eq!(rec.get("a"), Some(&FieldValue::Float(2.5)));
        assert!(matches!(rec.get("m"), Some(FieldValue::Object(_))));
        assert!(rec.get("n").unwrap().is_null());
    }

    #[test]
    fn test_bytes_render_as_base64() {
        let rec = Record::new().with("blob", vec![0u8, 1, 2]);
        assert_eq!(rec.to_json(), json!({"blob": "AAEC"}));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Record::from_json(json!([1, 2])).is_none());
    }

    #[test]
    fn test_merge_and_without_id() {
        let mut rec = Record::new().with(ID_FIELD, 7).with("x", 1);
        rec.merge(&Record::new().with("x", 2).with("y", 3));
        assert_eq!(rec.get("x"), Some(&FieldValue::Int(2)));
        assert_eq!(rec.len(), 3);
        assert!(!rec.without_id().contains(ID_FIELD));
        assert!(rec.contains(ID_FIELD));
    }

    #[test]
    fn test_stamp_date() {
        let mut rec = Record::new();
        rec.stamp_date();
        let stamp = rec.get(DATE_FIELD).and_then(|v| v.as_str()).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
