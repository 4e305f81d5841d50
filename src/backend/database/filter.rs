use super::identity::id_from_value;
use super::schema::{Column, ColumnType, Schema};
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record, ID_FIELD};
use crate::parser::{Condition, Filter, SortOrder, SortSpec};

/// SQL dialect differences between relational backends
pub trait SqlDialect: Send + Sync {
    /// Get the parameter placeholder for the given 1-based index
    ///
    /// For example:
    /// - PostgreSQL: $1, $2, $3...
    /// - SQLite: ?1, ?2, ?3...
    fn placeholder(&self, index: usize) -> String;

    /// Declared type for a column
    fn column_type_name(&self, ty: ColumnType) -> &'static str;

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier)
    }

    fn add_column_sql(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote(table),
            self.quote(&column.name),
            self.column_type_name(column.ty)
        )
    }

    fn rename_column_sql(&self, table: &str, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(old),
            self.quote(new)
        )
    }
}

/// Translates filters, updates and sort specs into SQL for one table.
///
/// Every referenced field must already have a column in `schema`; creating
/// missing columns is the adapter's job. Parameters are collected in the
/// order their placeholders appear, so clauses must be generated in
/// statement order.
pub struct SqlTranslator<'a> {
    dialect: &'a dyn SqlDialect,
    schema: &'a Schema,
    params: Vec<FieldValue>,
}

impl<'a> SqlTranslator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, schema: &'a Schema) -> Self {
        Self {
            dialect,
            schema,
            params: Vec::new(),
        }
    }

    pub fn table(&self) -> String {
        self.dialect.quote(self.schema.table())
    }

    pub fn into_params(self) -> Vec<FieldValue> {
        self.params
    }

    /// ` WHERE ...`, or an empty string for an empty filter
    pub fn where_clause(&mut self, filter: &Filter) -> StoreResult<String> {
        if filter.is_empty() {
            return Ok(String::new());
        }
        let condition = self.filter_sql(filter)?;
        Ok(format!(" WHERE {}", condition))
    }

    /// `"a" = ?1, "b" = NULL` for the fields of an update
    pub fn set_clause(&mut self, fields: &Record) -> StoreResult<String> {
        let mut assignments = Vec::new();
        for (name, value) in fields.iter() {
            if value.is_null() && !self.schema.has_column(name) {
                continue;
            }
            let column = self.column(name)?;
            let target = self.dialect.quote(name);
            if value.is_null() {
                assignments.push(format!("{} = NULL", target));
            } else {
                let placeholder = self.bind(&column, value)?;
                assignments.push(format!("{} = {}", target, placeholder));
            }
        }
        Ok(assignments.join(", "))
    }

    /// ` ORDER BY ...`, or an empty string when unsorted.
    ///
    /// Nulls sort first ascending and last descending on both dialects, and
    /// ties break on the identity column.
    pub fn order_clause(&self, sort: &SortSpec) -> StoreResult<String> {
        let direction = match sort.order {
            SortOrder::Unsorted => return Ok(String::new()),
            SortOrder::Ascending => "ASC NULLS FIRST",
            SortOrder::Descending => "DESC NULLS LAST",
        };
        self.column(&sort.field)?;
        let mut clause = format!(" ORDER BY {} {}", self.dialect.quote(&sort.field), direction);
        if sort.field != ID_FIELD {
            clause.push_str(&format!(", {} ASC", self.dialect.quote(ID_FIELD)));
        }
        Ok(clause)
    }

    /// `INSERT` for one record; null fields are left out
    pub fn insert_statement(&mut self, record: &Record) -> StoreResult<String> {
        let mut names = Vec::new();
        let mut placeholders = Vec::new();
        for (name, value) in record.iter() {
            if value.is_null() {
                continue;
            }
            let column = self.column(name)?;
            placeholders.push(self.bind(&column, value)?);
            names.push(self.dialect.quote(name));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            names.join(", "),
            placeholders.join(", ")
        ))
    }

    fn filter_sql(&mut self, filter: &Filter) -> StoreResult<String> {
        if filter.is_empty() {
            return Ok("1 = 1".to_string());
        }
        let parts = filter
            .conditions()
            .iter()
            .map(|c| self.condition_sql(c))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(match parts.len() {
            1 => parts.into_iter().next().unwrap_or_default(),
            _ => format!("({})", parts.join(" AND ")),
        })
    }

    fn condition_sql(&mut self, condition: &Condition) -> StoreResult<String> {
        match condition {
            Condition::Equal(field, value) => {
                let column = self.column(field)?;
                let target = self.dialect.quote(field);
                if value.is_null() {
                    return Ok(format!("{} IS NULL", target));
                }
                Ok(match self.bind_match(&column, value)? {
                    Some(placeholder) => format!("{} = {}", target, placeholder),
                    None => "1 = 0".to_string(),
                })
            }
            Condition::In(field, values) => {
                let column = self.column(field)?;
                let target = self.dialect.quote(field);
                let mut placeholders = Vec::new();
                for value in values.iter().filter(|v| !v.is_null()) {
                    placeholders.extend(self.bind_match(&column, value)?);
                }
                let with_null = values.iter().any(|v| v.is_null());
                Ok(match (placeholders.is_empty(), with_null) {
                    (true, false) => "1 = 0".to_string(),
                    (true, true) => format!("{} IS NULL", target),
                    (false, false) => format!("{} IN ({})", target, placeholders.join(", ")),
                    (false, true) => format!(
                        "({} IN ({}) OR {} IS NULL)",
                        target,
                        placeholders.join(", "),
                        target
                    ),
                })
            }
            Condition::Exists(field, present) => {
                self.column(field)?;
                let target = self.dialect.quote(field);
                Ok(if *present {
                    format!("{} IS NOT NULL", target)
                } else {
                    format!("{} IS NULL", target)
                })
            }
            Condition::Or(branches) => self.join_branches(branches, " OR ", "1 = 0"),
            Condition::And(branches) => self.join_branches(branches, " AND ", "1 = 1"),
        }
    }

    fn join_branches(
        &mut self,
        branches: &[Filter],
        separator: &str,
        when_empty: &str,
    ) -> StoreResult<String> {
        if branches.is_empty() {
            return Ok(when_empty.to_string());
        }
        let parts = branches
            .iter()
            .map(|b| self.filter_sql(b))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(format!("({})", parts.join(separator)))
    }

    fn column(&self, field: &str) -> StoreResult<Column> {
        self.schema
            .column(field)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchField {
                table: self.schema.table().to_string(),
                field: field.to_string(),
            })
    }

    fn bind(&mut self, column: &Column, value: &FieldValue) -> StoreResult<String> {
        let bound = if column.name == ID_FIELD {
            FieldValue::Int(id_from_value(value)?)
        } else {
            column.ty.coerce(&column.name, value)?
        };
        self.params.push(bound);
        Ok(self.dialect.placeholder(self.params.len()))
    }

    /// Bind a filter value; `None` when it cannot equal anything in `column`
    fn bind_match(&mut self, column: &Column, value: &FieldValue) -> StoreResult<Option<String>> {
        if column.name == ID_FIELD {
            return self.bind(column, value).map(Some);
        }
        match column.ty.coerce_match(&column.name, value)? {
            Some(bound) => {
                self.params.push(bound);
                Ok(Some(self.dialect.placeholder(self.params.len())))
            }
            None => Ok(None),
        }
    }
}
