use super::filter::SqlDialect;
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record, ID_FIELD};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Reject table and column names that cannot be safely quoted into SQL
pub fn validate_identifier(name: &str) -> StoreResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "'{}' is not a valid table or field name",
            name
        )))
    }
}

/// Column types a relational table may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInteger,
    Text,
    Float,
    Blob,
    Boolean,
    Json,
}

impl ColumnType {
    /// Map a field value to the column type that stores it.
    ///
    /// Lists have no relational representation and are rejected, as is null
    /// (there is nothing to infer from).
    pub fn infer(field: &str, value: &FieldValue) -> StoreResult<ColumnType> {
        match value {
            FieldValue::Int(_) => Ok(ColumnType::BigInteger),
            FieldValue::Text(_) => Ok(ColumnType::Text),
            FieldValue::Float(_) => Ok(ColumnType::Float),
            FieldValue::Bytes(_) => Ok(ColumnType::Blob),
            FieldValue::Bool(_) => Ok(ColumnType::Boolean),
            FieldValue::Object(_) => Ok(ColumnType::Json),
            FieldValue::List(_) | FieldValue::Null => Err(StoreError::UnsupportedType {
                field: field.to_string(),
                found: value.type_name(),
            }),
        }
    }

    /// Map a catalog type name from either dialect back to a column type
    pub fn from_sql_name(name: &str) -> Option<ColumnType> {
        match name.trim().to_lowercase().as_str() {
            "bigint" | "integer" | "int" | "int8" => Some(ColumnType::BigInteger),
            "text" | "varchar" | "character varying" => Some(ColumnType::Text),
            "real" | "double" | "double precision" | "float8" => Some(ColumnType::Float),
            "blob" | "bytea" => Some(ColumnType::Blob),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "json" | "jsonb" => Some(ColumnType::Json),
            _ => None,
        }
    }

    /// Convert `value` to the representation bound for this column.
    ///
    /// Integers widen into float columns; any other mismatch is rejected.
    pub fn coerce(&self, field: &str, value: &FieldValue) -> StoreResult<FieldValue> {
        match (self, value) {
            (_, FieldValue::Null) => Ok(FieldValue::Null),
            (_, FieldValue::List(_)) => Err(StoreError::UnsupportedType {
                field: field.to_string(),
                found: value.type_name(),
            }),
            (ColumnType::BigInteger, FieldValue::Int(_))
            | (ColumnType::Text, FieldValue::Text(_))
            | (ColumnType::Float, FieldValue::Float(_))
            | (ColumnType::Blob, FieldValue::Bytes(_))
            | (ColumnType::Boolean, FieldValue::Bool(_))
            | (ColumnType::Json, FieldValue::Object(_)) => Ok(value.clone()),
            (ColumnType::Float, FieldValue::Int(i)) => Ok(FieldValue::Float(*i as f64)),
            _ => Err(StoreError::InvalidArgument(format!(
                "Field '{}' holds {:?} values, got {}",
                field,
                self,
                value.type_name()
            ))),
        }
    }

    /// Convert a filter value compared against this column.
    ///
    /// A float matches an integer column only when it is integral; `None`
    /// means no stored value can be equal to it.
    pub fn coerce_match(&self, field: &str, value: &FieldValue) -> StoreResult<Option<FieldValue>> {
        match (self, value) {
            (ColumnType::BigInteger, FieldValue::Float(f)) => {
                let integral = f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64;
                Ok(integral.then(|| FieldValue::Int(*f as i64)))
            }
            _ => self.coerce(field, value).map(Some),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn identity() -> Self {
        Self::new(ID_FIELD, ColumnType::BigInteger)
    }
}

/// Column layout of one table.
///
/// Built once when a table is first written and afterwards only extended
/// through [`Schema::with_column`].
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    table: String,
    columns: Vec<Column>,
}

impl Schema {
    /// Schema holding only the identity column
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: vec![Column::identity()],
        }
    }

    /// Schema from explicit column definitions; the identity column is
    /// prepended when absent.
    pub fn with_columns(table: impl Into<String>, columns: Vec<Column>) -> StoreResult<Self> {
        let mut schema = Self {
            table: table.into(),
            columns: Vec::new(),
        };
        if !columns.iter().any(|c| c.name == ID_FIELD) {
            schema.columns.push(Column::identity());
        }
        for column in columns {
            validate_identifier(&column.name)?;
            if !schema.has_column(&column.name) {
                schema.columns.push(column);
            }
        }
        Ok(schema)
    }

    /// Infer a schema from a sample record
    pub fn from_record(table: impl Into<String>, record: &Record) -> StoreResult<Self> {
        Self::from_records(table, std::slice::from_ref(record))
    }

    /// Infer a schema from the union of the records' fields.
    ///
    /// The first non-null value of a field picks its type, except that a
    /// float seen after integers widens the column to float. Null-only
    /// fields get no column.
    pub fn from_records(table: impl Into<String>, records: &[Record]) -> StoreResult<Self> {
        let mut schema = Self::new(table);
        for record in records {
            for (name, value) in record.iter() {
                if name == ID_FIELD || value.is_null() {
                    continue;
                }
                validate_identifier(name)?;
                let ty = ColumnType::infer(name, value)?;
                match schema.columns.iter_mut().find(|c| c.name == name) {
                    Some(existing) => {
                        if existing.ty == ColumnType::BigInteger && ty == ColumnType::Float {
                            existing.ty = ColumnType::Float;
                        }
                    }
                    None => schema.columns.push(Column::new(name, ty)),
                }
            }
        }
        Ok(schema)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Copy of this schema extended by `column`; unchanged if already present
    pub fn with_column(&self, column: Column) -> Self {
        let mut extended = self.clone();
        if !extended.has_column(&column.name) {
            extended.columns.push(column);
        }
        extended
    }

    pub fn with_renamed_column(&self, old: &str, new: &str) -> Self {
        let mut renamed = self.clone();
        if let Some(column) = renamed.columns.iter_mut().find(|c| c.name == old) {
            column.name = new.to_string();
        }
        renamed
    }

    pub fn create_table_sql(&self, dialect: &dyn SqlDialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!(
                    "{} {}",
                    dialect.quote(&c.name),
                    dialect.column_type_name(c.ty)
                );
                if c.name == ID_FIELD {
                    def.push_str(" PRIMARY KEY");
                }
                def
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.quote(&self.table),
            columns.join(", ")
        )
    }
}
