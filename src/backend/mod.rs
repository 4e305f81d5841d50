use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record};
use crate::parser::{Filter, SortSpec};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub mod config;
pub mod connection;
pub mod database;
pub mod document;
pub mod results;

pub use config::BackendConfig;
pub use connection::{Connection, ConnectionManager};
pub use results::{DeleteResult, UpdateResult};

/// Default cap on records returned by `read` and `select`
pub const DOC_LIMIT: u64 = 100_000;

/// Supported storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    MongoDb,
    Sqlite,
    PostgreSql,
}

impl BackendKind {
    /// Parse a configured backend name; unknown names are a configuration error.
    pub fn parse(name: &str) -> StoreResult<Self> {
        match name.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(BackendKind::MongoDb),
            "sqlite" => Ok(BackendKind::Sqlite),
            "postgresql" | "postgres" => Ok(BackendKind::PostgreSql),
            _ => Err(StoreError::Configuration(format!(
                "Unsupported backend kind: {}",
                name
            ))),
        }
    }

    pub fn is_relational(&self) -> bool {
        !matches!(self, BackendKind::MongoDb)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::MongoDb => "mongodb",
            BackendKind::Sqlite => "sqlite",
            BackendKind::PostgreSql => "postgresql",
        };
        write!(f, "{}", name)
    }
}

/// Optional operations a backend may or may not offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `append_to_list` / `delete_from_list`
    pub list_fields: bool,
    /// `aggregate` pipeline passthrough
    pub aggregate: bool,
    /// Case-insensitive regex `search`
    pub search: bool,
}

/// Options for [`RecordStore::select`]
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    pub sort: SortSpec,
    /// Fields to return; empty means all fields
    pub projection: Vec<String>,
    pub limit: u64,
    pub no_id: bool,
    pub exclude_fields: Vec<String>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            sort: SortSpec::unsorted(),
            projection: Vec::new(),
            limit: DOC_LIMIT,
            no_id: false,
            exclude_fields: Vec::new(),
        }
    }
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_projection<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn without_id(mut self) -> Self {
        self.no_id = true;
        self
    }

    pub fn excluding<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Drop the fields named in `exclude_fields` from a fetched record
    pub(crate) fn apply_exclusions(&self, record: &mut Record) {
        for field in &self.exclude_fields {
            record.remove(field);
        }
    }
}

/// Connection-level backend abstraction
///
/// Each backend implementation (MongoDB, SQLite, PostgreSQL) implements this
/// alongside [`RecordStore`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Connect and initialize the storage backend
    async fn connect(config: &BackendConfig) -> StoreResult<Self>
    where
        Self: Sized;

    /// Check if the storage backend is healthy and accessible
    async fn health_check(&self) -> StoreResult<()>;

    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;
}

/// The CRUD contract every adapter implements.
///
/// Every call names the database (`db`) and the collection within it. Reads
/// that find nothing return `None` or an empty list; writes that match
/// nothing return zero counts.
#[async_trait]
pub trait RecordStore: Backend {
    /// Fetch one record that meets `filter`
    async fn read_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        no_id: bool,
    ) -> StoreResult<Option<Record>>;

    /// Fetch every record of a collection, optionally sorted
    async fn read(
        &self,
        db: &str,
        collection: &str,
        sort: &SortSpec,
        no_id: bool,
    ) -> StoreResult<Vec<Record>>;

    /// Filtered, sorted, projected and limited read
    async fn select(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Record>>;

    /// Fetch the record identified by `id` if it exists
    async fn fetch_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        no_id: bool,
    ) -> StoreResult<Option<Record>>;

    /// Count records meeting `filter`
    async fn count(&self, db: &str, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Insert a record and return its identity as a string
    async fn create(
        &self,
        db: &str,
        collection: &str,
        record: &Record,
        with_date: bool,
    ) -> StoreResult<String>;

    /// Insert several records, returning their identities in order
    async fn create_many(
        &self,
        db: &str,
        collection: &str,
        records: &[Record],
        with_date: bool,
    ) -> StoreResult<Vec<String>>;

    /// Set `fields` on the first record meeting `filter`
    async fn update(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
        upsert: bool,
    ) -> StoreResult<UpdateResult>;

    /// Set `fields` on every record meeting `filter`
    async fn update_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<UpdateResult>;

    /// Update the matching record or create one; returns its identity
    async fn upsert(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<String>;

    /// Delete one record meeting `filter`
    async fn delete(&self, db: &str, collection: &str, filter: &Filter)
        -> StoreResult<DeleteResult>;

    /// Delete every record meeting `filter`
    async fn delete_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult>;

    async fn delete_by_id(&self, db: &str, collection: &str, id: &str)
        -> StoreResult<DeleteResult>;

    /// Rename fields on every record; pairs are `(old, new)`
    async fn rename(
        &self,
        db: &str,
        collection: &str,
        name_map: &[(String, String)],
    ) -> StoreResult<()>;

    /// Set `field` to `value` on every record
    async fn add_field_to_all(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> StoreResult<UpdateResult>;

    /// Push `item` onto the list in `list_field`, upserting the record
    async fn append_to_list(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        item: &FieldValue,
    ) -> StoreResult<UpdateResult>;

    /// Pull `item` from the list in `list_field`, upserting the record
    async fn delete_from_list(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        item: &FieldValue,
    ) -> StoreResult<UpdateResult>;

    /// Run a native aggregation pipeline untouched
    async fn aggregate(
        &self,
        _db: &str,
        _collection: &str,
        _pipeline: &[Record],
    ) -> StoreResult<Vec<Record>> {
        Err(StoreError::unsupported(self.kind(), "aggregate"))
    }

    /// Records whose `field` matches `pattern`, ignoring case. With
    /// `active_only`, only records whose `active` flag is true.
    async fn search(
        &self,
        _db: &str,
        _collection: &str,
        _field: &str,
        _pattern: &str,
        _active_only: bool,
    ) -> StoreResult<Vec<Record>> {
        Err(StoreError::unsupported(self.kind(), "search"))
    }
}

/// Factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend based on configuration
    pub async fn create(config: &BackendConfig) -> StoreResult<Arc<dyn RecordStore>> {
        match config.kind {
            BackendKind::Sqlite => {
                let backend = database::sqlite::SqliteStore::connect(config).await?;
                Ok(Arc::new(backend))
            }
            BackendKind::PostgreSql => {
                let backend = database::postgres::PostgresStore::connect(config).await?;
                Ok(Arc::new(backend))
            }
            BackendKind::MongoDb => {
                let backend = document::DocumentStore::connect(config).await?;
                Ok(Arc::new(backend))
            }
        }
    }
}
