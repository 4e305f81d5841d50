//! Relational record store
//!
//! This module implements the CRUD contract once for every SQL backend. The
//! dialect-specific parts (pooling, binding, decoding, catalog queries) sit
//! behind [`SqlExecutor`], mirroring how the unified operations wrap a
//! database-specific adapter.
//!
//! ```text
//! RelationalAdapter<E: SqlExecutor>
//!     ├── schema cache + on-demand columns
//!     ├── SqlTranslator (filters, updates, sorting)
//!     └── E
//!         ├── SqliteExecutor
//!         └── PostgresExecutor
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::filter::{SqlDialect, SqlTranslator};
use super::identity::{id_from_value, parse_id, IdGenerator};
use super::schema::{validate_identifier, Column, ColumnType, Schema};
use crate::backend::{
    Backend, BackendConfig, BackendKind, Capabilities, DeleteResult, RecordStore, SelectOptions,
    UpdateResult, DOC_LIMIT,
};
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record, ID_FIELD};
use crate::parser::{Condition, Filter, SortSpec};

/// Dialect-specific statement execution
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Open a connection pool for the configured database
    async fn connect(config: &BackendConfig) -> StoreResult<Self>
    where
        Self: Sized;

    fn kind(&self) -> BackendKind;

    fn dialect(&self) -> &dyn SqlDialect;

    /// Run a statement and return the number of affected rows
    async fn execute(&self, sql: &str, params: Vec<FieldValue>) -> StoreResult<u64>;

    /// Run a query and decode `columns` from every row.
    ///
    /// NULL columns are left out of the returned records.
    async fn fetch(
        &self,
        sql: &str,
        params: Vec<FieldValue>,
        columns: &[Column],
    ) -> StoreResult<Vec<Record>>;

    /// Read a table's columns from the catalog; `None` if the table is absent
    async fn load_schema(&self, table: &str) -> StoreResult<Option<Schema>>;

    /// Add a column, treating "already exists" as success
    async fn add_column(&self, table: &str, column: &Column) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// CRUD contract over any [`SqlExecutor`].
///
/// Table layouts are cached after the first catalog read and kept current as
/// this adapter creates tables, adds columns and renames them. Schema changes
/// are not locked: concurrent writers may both try to add the same column,
/// which the executor tolerates.
pub struct RelationalAdapter<E: SqlExecutor> {
    executor: E,
    schemas: RwLock<HashMap<String, Schema>>,
    ids: IdGenerator,
}

impl<E: SqlExecutor> RelationalAdapter<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            schemas: RwLock::new(HashMap::new()),
            ids: IdGenerator::new(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Create a table with explicit columns, or extend it if it exists
    pub async fn create_table(
        &self,
        db: &str,
        collection: &str,
        columns: Vec<Column>,
    ) -> StoreResult<Schema> {
        let table = Self::table(db, collection)?;
        let wanted = Schema::with_columns(table.as_str(), columns)?;
        self.ensure_schema(&table, wanted).await
    }

    /// Current layout of a table, if it exists
    pub async fn schema(&self, db: &str, collection: &str) -> StoreResult<Option<Schema>> {
        let table = Self::table(db, collection)?;
        self.cached_schema(&table).await
    }

    fn table(db: &str, collection: &str) -> StoreResult<String> {
        let table = BackendConfig::table_name(db, collection);
        validate_identifier(&table)?;
        Ok(table)
    }

    async fn cached_schema(&self, table: &str) -> StoreResult<Option<Schema>> {
        if let Some(schema) = self.schemas.read().await.get(table) {
            return Ok(Some(schema.clone()));
        }
        self.reload_schema(table).await
    }

    async fn reload_schema(&self, table: &str) -> StoreResult<Option<Schema>> {
        let loaded = self.executor.load_schema(table).await?;
        let mut schemas = self.schemas.write().await;
        match &loaded {
            Some(schema) => {
                schemas.insert(table.to_string(), schema.clone());
            }
            None => {
                schemas.remove(table);
            }
        }
        Ok(loaded)
    }

    /// Make sure `table` exists with at least the columns of `wanted`
    async fn ensure_schema(&self, table: &str, wanted: Schema) -> StoreResult<Schema> {
        let mut schema = match self.cached_schema(table).await? {
            Some(schema) => schema,
            None => {
                let sql = wanted.create_table_sql(self.executor.dialect());
                debug!("{}", sql);
                self.executor.execute(&sql, Vec::new()).await?;
                info!("Created table {}", table);
                self.reload_schema(table).await?.ok_or_else(|| {
                    StoreError::Database(format!("Table {} missing after creation", table))
                })?
            }
        };

        for column in wanted.columns() {
            if !schema.has_column(&column.name) {
                schema = self.ensure_column(&schema, column.clone()).await?;
            }
        }
        Ok(schema)
    }

    async fn ensure_table(&self, table: &str, records: &[Record]) -> StoreResult<Schema> {
        let wanted = Schema::from_records(table, records)?;
        self.ensure_schema(table, wanted).await
    }

    async fn ensure_column(&self, schema: &Schema, column: Column) -> StoreResult<Schema> {
        validate_identifier(&column.name)?;
        info!(
            "Adding column {} ({:?}) to {}",
            column.name,
            column.ty,
            schema.table()
        );
        self.executor.add_column(schema.table(), &column).await?;

        // Another writer may have added it first with a different type
        Ok(self
            .reload_schema(schema.table())
            .await?
            .unwrap_or_else(|| schema.with_column(column)))
    }

    /// Add columns for filter fields compared against a value
    async fn resolve_filter(&self, schema: Schema, filter: &Filter) -> StoreResult<Schema> {
        let mut referenced = Vec::new();
        collect_filter_values(filter, &mut referenced);

        let mut schema = schema;
        for (field, value) in referenced {
            if !schema.has_column(field) {
                let column = Column::new(field, ColumnType::infer(field, value)?);
                schema = self.ensure_column(&schema, column).await?;
            }
        }
        Ok(schema)
    }

    /// Add columns for non-null update fields
    async fn resolve_fields(&self, schema: Schema, fields: &Record) -> StoreResult<Schema> {
        let mut schema = schema;
        for (name, value) in fields.iter() {
            if value.is_null() || schema.has_column(name) {
                continue;
            }
            let column = Column::new(name, ColumnType::infer(name, value)?);
            schema = self.ensure_column(&schema, column).await?;
        }
        Ok(schema)
    }

    async fn select_rows(
        &self,
        schema: &Schema,
        filter: &Filter,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Record>> {
        let columns: Vec<Column> = if options.projection.is_empty() {
            schema.columns().to_vec()
        } else {
            schema
                .columns()
                .iter()
                .filter(|c| c.name == ID_FIELD || options.projection.contains(&c.name))
                .cloned()
                .collect()
        };

        let dialect = self.executor.dialect();
        let mut translator = SqlTranslator::new(dialect, schema);
        let where_clause = translator.where_clause(filter)?;
        let order_clause = translator.order_clause(&options.sort)?;
        let names: Vec<String> = columns.iter().map(|c| dialect.quote(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {}{}{} LIMIT {}",
            names.join(", "),
            translator.table(),
            where_clause,
            order_clause,
            options.limit
        );
        debug!("{}", sql);

        let mut records = self
            .executor
            .fetch(&sql, translator.into_params(), &columns)
            .await?;
        for record in records.iter_mut() {
            if options.no_id {
                record.remove(ID_FIELD);
            }
            options.apply_exclusions(record);
        }
        Ok(records)
    }

    async fn count_rows(&self, schema: &Schema, filter: &Filter) -> StoreResult<u64> {
        let mut translator = SqlTranslator::new(self.executor.dialect(), schema);
        let where_clause = translator.where_clause(filter)?;
        let sql = format!("SELECT COUNT(*) AS n FROM {}{}", translator.table(), where_clause);
        debug!("{}", sql);

        let column = Column::new("n", ColumnType::BigInteger);
        let rows = self
            .executor
            .fetch(&sql, translator.into_params(), std::slice::from_ref(&column))
            .await?;
        let count = rows
            .first()
            .and_then(|r| r.get("n"))
            .and_then(FieldValue::as_i64)
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Run `UPDATE` for the first matching row, or every matching row
    async fn update_rows(
        &self,
        schema: &Schema,
        filter: &Filter,
        fields: &Record,
        first_only: bool,
    ) -> StoreResult<UpdateResult> {
        let mut translator = SqlTranslator::new(self.executor.dialect(), schema);
        let set_clause = translator.set_clause(fields)?;
        if set_clause.is_empty() {
            // Only nulls for fields no record has; nothing to write
            let matched = self.count_rows(schema, filter).await?;
            let matched = if first_only { matched.min(1) } else { matched };
            return Ok(UpdateResult::new(matched, 0));
        }
        let where_clause = translator.where_clause(filter)?;
        let table = translator.table();
        let sql = if first_only {
            let id = self.executor.dialect().quote(ID_FIELD);
            format!(
                "UPDATE {} SET {} WHERE {} IN (SELECT {} FROM {}{} LIMIT 1)",
                table, set_clause, id, id, table, where_clause
            )
        } else {
            format!("UPDATE {} SET {}{}", table, set_clause, where_clause)
        };
        debug!("{}", sql);

        let rows = self.executor.execute(&sql, translator.into_params()).await?;
        Ok(UpdateResult::new(rows, rows))
    }

    async fn delete_rows(
        &self,
        schema: &Schema,
        filter: &Filter,
        first_only: bool,
    ) -> StoreResult<DeleteResult> {
        let mut translator = SqlTranslator::new(self.executor.dialect(), schema);
        let where_clause = translator.where_clause(filter)?;
        let table = translator.table();
        let sql = if first_only {
            let id = self.executor.dialect().quote(ID_FIELD);
            format!(
                "DELETE FROM {} WHERE {} IN (SELECT {} FROM {}{} LIMIT 1)",
                table, id, id, table, where_clause
            )
        } else {
            format!("DELETE FROM {}{}", table, where_clause)
        };
        debug!("{}", sql);

        let rows = self.executor.execute(&sql, translator.into_params()).await?;
        Ok(DeleteResult::new(rows))
    }

    /// Insert prepared records into `table`, returning their ids
    async fn insert_records(
        &self,
        table: &str,
        records: &[Record],
        with_date: bool,
    ) -> StoreResult<Vec<String>> {
        let mut prepared = Vec::with_capacity(records.len());
        for record in records {
            reject_unstorable(record)?;
            let mut record = record.clone();
            if with_date {
                record.stamp_date();
            }
            let id = match record.id() {
                Some(value) if !value.is_null() => id_from_value(value)?,
                _ => self.ids.next_id(),
            };
            record.insert(ID_FIELD, id);
            prepared.push((id, record));
        }

        let samples: Vec<Record> = prepared.iter().map(|(_, r)| r.clone()).collect();
        let schema = self.ensure_table(table, &samples).await?;

        let mut ids = Vec::with_capacity(prepared.len());
        for (id, record) in prepared {
            let mut translator = SqlTranslator::new(self.executor.dialect(), &schema);
            let sql = translator.insert_statement(&record)?;
            debug!("{}", sql);
            self.executor.execute(&sql, translator.into_params()).await?;
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    /// Read-then-branch upsert.
    ///
    /// Not atomic: two callers racing on the same filter can both miss the
    /// read and insert two records.
    async fn upsert_record(
        &self,
        table: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<(String, UpdateResult)> {
        check_update(fields)?;
        if let Some(schema) = self.cached_schema(table).await? {
            let schema = self.resolve_filter(schema, filter).await?;
            let options = SelectOptions::new().with_projection([ID_FIELD]).with_limit(1);
            let existing = self.select_rows(&schema, filter, &options).await?;

            if let Some(id) = existing.first().and_then(|r| r.id()).cloned() {
                let schema = self.resolve_fields(schema, fields).await?;
                let by_id = Filter::by(ID_FIELD, id.clone());
                let result = self.update_rows(&schema, &by_id, fields, true).await?;
                return Ok((id.to_string(), result));
            }
        }

        let mut record = filter.equality_fields();
        record.merge(fields);
        let mut ids = self.insert_records(table, &[record], false).await?;
        let id = ids.pop().ok_or_else(|| {
            StoreError::Database(format!("Upsert into {} returned no id", table))
        })?;
        Ok((id.clone(), UpdateResult::upserted(id)))
    }
}

fn collect_filter_values<'f>(filter: &'f Filter, out: &mut Vec<(&'f str, &'f FieldValue)>) {
    for condition in filter.conditions() {
        match condition {
            Condition::Equal(field, value) if !value.is_null() => out.push((field.as_str(), value)),
            Condition::In(field, values) => {
                if let Some(value) = values.iter().find(|v| !v.is_null()) {
                    out.push((field.as_str(), value));
                }
            }
            Condition::Or(branches) | Condition::And(branches) => {
                for branch in branches {
                    collect_filter_values(branch, out);
                }
            }
            _ => {}
        }
    }
}

fn check_update(fields: &Record) -> StoreResult<()> {
    if fields.is_empty() {
        return Err(StoreError::InvalidArgument(
            "An update needs at least one field".to_string(),
        ));
    }
    reject_unstorable(fields)
}

/// Lists cannot be stored at any depth. Bytes get a blob column at the top
/// level but would not survive the JSON text of a structured column.
fn reject_unstorable(record: &Record) -> StoreResult<()> {
    for (name, value) in record.iter() {
        match value {
            FieldValue::List(_) => return Err(unsupported_field(name.to_string(), value)),
            FieldValue::Object(inner) => check_nested(name, inner)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_nested(path: &str, record: &Record) -> StoreResult<()> {
    for (name, value) in record.iter() {
        let path = format!("{}.{}", path, name);
        match value {
            FieldValue::List(_) | FieldValue::Bytes(_) => {
                return Err(unsupported_field(path, value))
            }
            FieldValue::Object(inner) => check_nested(&path, inner)?,
            _ => {}
        }
    }
    Ok(())
}

fn unsupported_field(field: String, value: &FieldValue) -> StoreError {
    StoreError::UnsupportedType {
        field,
        found: value.type_name(),
    }
}

#[async_trait]
impl<E: SqlExecutor> Backend for RelationalAdapter<E> {
    async fn connect(config: &BackendConfig) -> StoreResult<Self> {
        let executor = E::connect(config).await?;
        Ok(Self::new(executor))
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.executor.health_check().await
    }

    fn kind(&self) -> BackendKind {
        self.executor.kind()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            list_fields: false,
            aggregate: false,
            search: false,
        }
    }
}

#[async_trait]
impl<E: SqlExecutor> RecordStore for RelationalAdapter<E> {
    async fn read_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        no_id: bool,
    ) -> StoreResult<Option<Record>> {
        let mut options = SelectOptions::new().with_limit(1);
        options.no_id = no_id;
        let records = self.select(db, collection, filter, &options).await?;
        Ok(records.into_iter().next())
    }

    async fn read(
        &self,
        db: &str,
        collection: &str,
        sort: &SortSpec,
        no_id: bool,
    ) -> StoreResult<Vec<Record>> {
        let mut options = SelectOptions::new()
            .with_sort(sort.clone())
            .with_limit(DOC_LIMIT);
        options.no_id = no_id;
        self.select(db, collection, &Filter::all(), &options).await
    }

    async fn select(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Record>> {
        let table = Self::table(db, collection)?;
        let Some(schema) = self.cached_schema(&table).await? else {
            return Ok(Vec::new());
        };
        let schema = self.resolve_filter(schema, filter).await?;
        self.select_rows(&schema, filter, options).await
    }

    async fn fetch_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        no_id: bool,
    ) -> StoreResult<Option<Record>> {
        let id = parse_id(id)?;
        self.read_one(db, collection, &Filter::by(ID_FIELD, id), no_id)
            .await
    }

    async fn count(&self, db: &str, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let table = Self::table(db, collection)?;
        let Some(schema) = self.cached_schema(&table).await? else {
            return Ok(0);
        };
        let schema = self.resolve_filter(schema, filter).await?;
        self.count_rows(&schema, filter).await
    }

    async fn create(
        &self,
        db: &str,
        collection: &str,
        record: &Record,
        with_date: bool,
    ) -> StoreResult<String> {
        let table = Self::table(db, collection)?;
        let mut ids = self
            .insert_records(&table, std::slice::from_ref(record), with_date)
            .await?;
        ids.pop()
            .ok_or_else(|| StoreError::Database(format!("Insert into {} returned no id", table)))
    }

    async fn create_many(
        &self,
        db: &str,
        collection: &str,
        records: &[Record],
        with_date: bool,
    ) -> StoreResult<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let table = Self::table(db, collection)?;
        self.insert_records(&table, records, with_date).await
    }

    async fn update(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        check_update(fields)?;
        let table = Self::table(db, collection)?;
        if upsert {
            let (_, result) = self.upsert_record(&table, filter, fields).await?;
            return Ok(result);
        }

        let Some(schema) = self.cached_schema(&table).await? else {
            return Ok(UpdateResult::new(0, 0));
        };
        let schema = self.resolve_filter(schema, filter).await?;
        let schema = self.resolve_fields(schema, fields).await?;
        self.update_rows(&schema, filter, fields, true).await
    }

    async fn update_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<UpdateResult> {
        check_update(fields)?;
        let table = Self::table(db, collection)?;
        let Some(schema) = self.cached_schema(&table).await? else {
            return Ok(UpdateResult::new(0, 0));
        };
        let schema = self.resolve_filter(schema, filter).await?;
        let schema = self.resolve_fields(schema, fields).await?;
        self.update_rows(&schema, filter, fields, false).await
    }

    async fn upsert(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<String> {
        let table = Self::table(db, collection)?;
        let (id, _) = self.upsert_record(&table, filter, fields).await?;
        Ok(id)
    }

    async fn delete(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult> {
        let table = Self::table(db, collection)?;
        let Some(schema) = self.cached_schema(&table).await? else {
            return Ok(DeleteResult::new(0));
        };
        let schema = self.resolve_filter(schema, filter).await?;
        self.delete_rows(&schema, filter, true).await
    }

    async fn delete_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult> {
        let table = Self::table(db, collection)?;
        let Some(schema) = self.cached_schema(&table).await? else {
            return Ok(DeleteResult::new(0));
        };
        let schema = self.resolve_filter(schema, filter).await?;
        self.delete_rows(&schema, filter, false).await
    }

    async fn delete_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<DeleteResult> {
        let id = parse_id(id)?;
        self.delete(db, collection, &Filter::by(ID_FIELD, id)).await
    }

    async fn rename(
        &self,
        db: &str,
        collection: &str,
        name_map: &[(String, String)],
    ) -> StoreResult<()> {
        let table = Self::table(db, collection)?;
        let Some(mut schema) = self.cached_schema(&table).await? else {
            return Ok(());
        };

        for (old, new) in name_map {
            if old == ID_FIELD || new == ID_FIELD {
                return Err(StoreError::InvalidArgument(
                    "The identity field cannot be renamed".to_string(),
                ));
            }
            validate_identifier(new)?;
            if !schema.has_column(old) {
                debug!("Skipping rename of missing column {} in {}", old, table);
                continue;
            }
            if schema.has_column(new) {
                return Err(StoreError::InvalidArgument(format!(
                    "Cannot rename '{}' to '{}': column already exists in {}",
                    old, new, table
                )));
            }

            let sql = self.executor.dialect().rename_column_sql(&table, old, new);
            debug!("{}", sql);
            self.executor.execute(&sql, Vec::new()).await?;
            schema = schema.with_renamed_column(old, new);
            self.schemas
                .write()
                .await
                .insert(table.clone(), schema.clone());
        }
        Ok(())
    }

    async fn add_field_to_all(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        if field == ID_FIELD {
            return Err(StoreError::InvalidArgument(
                "The identity field cannot be set on every record".to_string(),
            ));
        }
        let fields = Record::new().with(field, value.clone());
        self.update_many(db, collection, &Filter::all(), &fields)
            .await
    }

    async fn append_to_list(
        &self,
        _db: &str,
        _collection: &str,
        _filter: &Filter,
        _list_field: &str,
        _item: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        Err(StoreError::unsupported(self.kind(), "append_to_list"))
    }

    async fn delete_from_list(
        &self,
        _db: &str,
        _collection: &str,
        _filter: &Filter,
        _list_field: &str,
        _item: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        Err(StoreError::unsupported(self.kind(), "delete_from_list"))
    }
}
