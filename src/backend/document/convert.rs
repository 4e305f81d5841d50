//! Conversions between records and BSON documents
//!
//! Filters are translated into MongoDB query documents, and documents read
//! back are turned into records with the native id flattened or stripped.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};

use crate::error::StoreResult;
use crate::models::{FieldValue, Record, ACTIVE_FIELD, ID_FIELD};
use crate::parser::{Condition, Filter};

const OID_KEY: &str = "$oid";
const DATE_KEY: &str = "$date";

pub fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Int(i) => Bson::Int64(*i),
        FieldValue::Float(f) => Bson::Double(*f),
        FieldValue::Text(s) => Bson::String(s.clone()),
        FieldValue::Bytes(b) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: b.clone(),
        }),
        FieldValue::Object(record) => match extended_object_id(record) {
            Some(oid) => Bson::ObjectId(oid),
            None => Bson::Document(to_document(record)),
        },
        FieldValue::List(items) => Bson::Array(items.iter().map(to_bson).collect()),
    }
}

pub fn to_document(record: &Record) -> Document {
    let mut document = Document::new();
    for (name, value) in record.iter() {
        document.insert(name, to_bson(value));
    }
    document
}

/// Like [`to_document`], but a text `_id` is stored the way identity
/// filters look it up (see [`id_to_bson`]).
pub fn to_stored_document(record: &Record) -> Document {
    let mut document = to_document(record);
    if let Some(FieldValue::Text(id)) = record.id() {
        document.insert(ID_FIELD, id_to_bson(id));
    }
    document
}

/// Read a BSON value back.
///
/// ObjectIds and dates come back in their extended JSON shape
/// (`{"$oid": ..}`, `{"$date": ..}`); see [`normalize_id`].
pub fn from_bson(value: Bson) -> FieldValue {
    match value {
        Bson::Null | Bson::Undefined => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(b),
        Bson::Int32(i) => FieldValue::Int(i as i64),
        Bson::Int64(i) => FieldValue::Int(i),
        Bson::Double(f) => FieldValue::Float(f),
        Bson::String(s) => FieldValue::Text(s),
        Bson::Binary(binary) => FieldValue::Bytes(binary.bytes),
        Bson::Document(document) => FieldValue::Object(from_document(document)),
        Bson::Array(items) => FieldValue::List(items.into_iter().map(from_bson).collect()),
        Bson::ObjectId(oid) => FieldValue::Object(Record::new().with(OID_KEY, oid.to_hex())),
        Bson::DateTime(dt) => {
            let text = dt.try_to_rfc3339_string().unwrap_or_else(|_| dt.to_string());
            FieldValue::Object(Record::new().with(DATE_KEY, text))
        }
        other => FieldValue::from(other.into_relaxed_extjson()),
    }
}

pub fn from_document(document: Document) -> Record {
    document
        .into_iter()
        .map(|(name, value)| (name, from_bson(value)))
        .collect()
}

/// Flatten the native id to its hex string, or strip it when `no_id` is set.
///
/// Applying this twice gives the same record as applying it once.
pub fn normalize_id(record: &mut Record, no_id: bool) {
    if no_id {
        record.remove(ID_FIELD);
        return;
    }
    let flat = match record.id() {
        Some(FieldValue::Object(inner)) => inner
            .get(OID_KEY)
            .and_then(FieldValue::as_str)
            .filter(|_| inner.len() == 1)
            .map(str::to_string),
        _ => None,
    };
    if let Some(hex) = flat {
        record.insert(ID_FIELD, hex);
    }
}

/// String form of an id returned by the driver
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Hex ids are native ObjectIds; any other text is a caller-assigned string id.
pub fn id_to_bson(id: &str) -> Bson {
    match ObjectId::parse_str(id) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

/// Case-insensitive regex match on one field, optionally limited to active records
pub fn search_document(field: &str, pattern: &str, active_only: bool) -> Document {
    let mut regex = Document::new();
    regex.insert("$regex", pattern);
    regex.insert("$options", "i");
    let mut document = Document::new();
    document.insert(field, regex);
    if !active_only {
        return document;
    }

    let mut active = Document::new();
    active.insert(ACTIVE_FIELD, true);
    if field == ACTIVE_FIELD {
        let mut combined = Document::new();
        combined.insert("$and", vec![Bson::Document(document), Bson::Document(active)]);
        return combined;
    }
    document.extend(active);
    document
}

/// Translate a filter into a MongoDB query document.
///
/// Conditions on distinct keys stay one flat document; when two conditions
/// share a key they are combined with `$and`.
pub fn filter_to_document(filter: &Filter) -> StoreResult<Document> {
    let parts = filter
        .conditions()
        .iter()
        .map(condition_to_document)
        .collect::<StoreResult<Vec<_>>>()?;

    let mut keys = std::collections::HashSet::new();
    let collides = parts
        .iter()
        .flat_map(|part| part.keys())
        .any(|key| !keys.insert(key.clone()));

    if collides {
        let all: Vec<Bson> = parts.into_iter().map(Bson::Document).collect();
        let mut combined = Document::new();
        combined.insert("$and", all);
        return Ok(combined);
    }

    let mut merged = Document::new();
    for (key, value) in parts.into_iter().flatten() {
        merged.insert(key, value);
    }
    Ok(merged)
}

fn condition_to_document(condition: &Condition) -> StoreResult<Document> {
    let mut document = Document::new();
    match condition {
        Condition::Equal(field, value) => {
            document.insert(field, field_to_bson(field, value)?);
        }
        Condition::In(field, values) => {
            let values = values
                .iter()
                .map(|v| field_to_bson(field, v))
                .collect::<StoreResult<Vec<_>>>()?;
            let mut operator = Document::new();
            operator.insert("$in", values);
            document.insert(field, operator);
        }
        Condition::Exists(field, present) => {
            let mut operator = Document::new();
            operator.insert("$exists", *present);
            document.insert(field, operator);
        }
        Condition::Or(branches) if branches.is_empty() => {
            // Matches nothing
            let mut operator = Document::new();
            operator.insert("$in", Vec::<Bson>::new());
            document.insert(ID_FIELD, operator);
        }
        Condition::Or(branches) => {
            document.insert("$or", branch_documents(branches)?);
        }
        Condition::And(branches) if branches.is_empty() => {}
        Condition::And(branches) => {
            document.insert("$and", branch_documents(branches)?);
        }
    }
    Ok(document)
}

fn branch_documents(branches: &[Filter]) -> StoreResult<Vec<Bson>> {
    branches
        .iter()
        .map(|b| filter_to_document(b).map(Bson::Document))
        .collect()
}

fn field_to_bson(field: &str, value: &FieldValue) -> StoreResult<Bson> {
    match (field, value) {
        (ID_FIELD, FieldValue::Text(id)) => Ok(id_to_bson(id)),
        _ => Ok(to_bson(value)),
    }
}

fn extended_object_id(record: &Record) -> Option<ObjectId> {
    if record.len() != 1 {
        return None;
    }
    record
        .get(OID_KEY)
        .and_then(FieldValue::as_str)
        .and_then(|hex| ObjectId::parse_str(hex).ok())
}
