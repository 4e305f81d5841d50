use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record, ID_FIELD};
use serde_json::Value;

/// A single predicate inside a [`Filter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    // Exact match, the only predicate the CRUD contract requires
    Equal(String, FieldValue),

    // Convenience predicates
    In(String, Vec<FieldValue>),
    Exists(String, bool),

    // Logical operators
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

/// Backend-agnostic record filter.
///
/// Conditions are implicitly AND-ed. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Single equality filter
    pub fn by(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::all().eq(field, value)
    }

    /// Identity filter from a caller-supplied id string.
    ///
    /// Each adapter converts the string to its native id representation.
    pub fn id(id: &str) -> Self {
        Self::by(ID_FIELD, id)
    }

    /// Equality filter built from every field of `record`
    pub fn matching(record: &Record) -> Self {
        Filter {
            conditions: record
                .iter()
                .map(|(n, v)| Condition::Equal(n.to_string(), v.clone()))
                .collect(),
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.conditions
            .push(Condition::Equal(field.into(), value.into()));
        self
    }

    pub fn in_values(field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Filter {
            conditions: vec![Condition::In(field.into(), values)],
        }
    }

    pub fn exists(field: impl Into<String>, present: bool) -> Self {
        Filter {
            conditions: vec![Condition::Exists(field.into(), present)],
        }
    }

    pub fn or(left: Filter, right: Filter) -> Self {
        Filter {
            conditions: vec![Condition::Or(vec![left, right])],
        }
    }

    pub fn and(left: Filter, right: Filter) -> Self {
        Filter {
            conditions: vec![Condition::And(vec![left, right])],
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Top-level equality conditions as a record.
    ///
    /// Used when an upsert has to materialize the filter as a new record.
    pub fn equality_fields(&self) -> Record {
        self.conditions
            .iter()
            .filter_map(|c| match c {
                Condition::Equal(field, value) => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Parse a JSON filter object.
    ///
    /// Plain members are equality conditions. `{"f": {"$in": [..]}}`,
    /// `{"f": {"$exists": bool}}`, `{"$or": [..]}` and `{"$and": [..]}` map to
    /// the convenience predicates.
    pub fn from_json(value: &Value) -> StoreResult<Filter> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidArgument(format!("Malformed filter: {}", value)))?;

        let mut filter = Filter::all();
        for (key, member) in object {
            let condition = match key.as_str() {
                "$or" => Condition::Or(Self::parse_branches(key, member)?),
                "$and" => Condition::And(Self::parse_branches(key, member)?),
                _ => Self::parse_member(key, member)?,
            };
            filter.conditions.push(condition);
        }
        Ok(filter)
    }

    fn parse_branches(key: &str, member: &Value) -> StoreResult<Vec<Filter>> {
        let branches = member.as_array().ok_or_else(|| {
            StoreError::InvalidArgument(format!("'{}' expects an array of filters", key))
        })?;
        branches.iter().map(Filter::from_json).collect()
    }

    fn parse_member(field: &str, member: &Value) -> StoreResult<Condition> {
        if let Some(operator) = member.as_object().filter(|o| o.len() == 1) {
            if let Some(values) = operator.get("$in") {
                let values = values.as_array().ok_or_else(|| {
                    StoreError::InvalidArgument(format!("'$in' on '{}' expects an array", field))
                })?;
                return Ok(Condition::In(
                    field.to_string(),
                    values.iter().cloned().map(Into::into).collect(),
                ));
            }
            if let Some(present) = operator.get("$exists") {
                let present = present.as_bool().ok_or_else(|| {
                    StoreError::InvalidArgument(format!("'$exists' on '{}' expects a boolean", field))
                })?;
                return Ok(Condition::Exists(field.to_string(), present));
            }
        }
        Ok(Condition::Equal(field.to_string(), member.clone().into()))
    }
}
