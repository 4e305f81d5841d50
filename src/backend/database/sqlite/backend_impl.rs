use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::backend::database::filter::SqlDialect;
use crate::backend::database::relational::{RelationalAdapter, SqlExecutor};
use crate::backend::database::schema::{Column, ColumnType, Schema};
use crate::backend::{BackendConfig, BackendKind};
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record};

/// SQLite record store
pub type SqliteStore = RelationalAdapter<SqliteExecutor>;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite flavor of SQL: `?N` placeholders, JSON stored as text
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn column_type_name(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::BigInteger => "BIGINT",
            ColumnType::Text => "TEXT",
            ColumnType::Float => "REAL",
            ColumnType::Blob => "BLOB",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Json => "JSON",
        }
    }
}

pub struct SqliteExecutor {
    pool: SqlitePool,
    dialect: SqliteDialect,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            dialect: SqliteDialect,
        }
    }

    /// Get the connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Accept bare paths and `:memory:` as well as `sqlite:` URLs
    fn normalize_url(url: &str) -> String {
        if url == ":memory:" {
            "sqlite::memory:".to_string()
        } else if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{}", url)
        }
    }

    fn bind_params<'q>(sql: &'q str, params: Vec<FieldValue>) -> StoreResult<SqliteQuery<'q>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                FieldValue::Null => query.bind(None::<String>),
                FieldValue::Bool(b) => query.bind(b),
                FieldValue::Int(i) => query.bind(i),
                FieldValue::Float(f) => query.bind(f),
                FieldValue::Text(s) => query.bind(s),
                FieldValue::Bytes(b) => query.bind(b),
                FieldValue::Object(r) => query.bind(r.to_json().to_string()),
                FieldValue::List(_) => {
                    return Err(StoreError::UnsupportedType {
                        field: "parameter".to_string(),
                        found: "list",
                    })
                }
            };
        }
        Ok(query)
    }

    fn decode_row(row: &SqliteRow, columns: &[Column]) -> StoreResult<Record> {
        let mut record = Record::new();
        for column in columns {
            let name = column.name.as_str();
            let decode_err =
                |e: sqlx::Error| StoreError::Database(format!("Failed to decode {}: {}", name, e));

            // Declared types carry no weight in SQLite, so decode unchecked
            let value = match column.ty {
                ColumnType::BigInteger => row
                    .try_get_unchecked::<Option<i64>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Int),
                ColumnType::Text => row
                    .try_get_unchecked::<Option<String>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Text),
                ColumnType::Float => row
                    .try_get_unchecked::<Option<f64>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Float),
                ColumnType::Blob => row
                    .try_get_unchecked::<Option<Vec<u8>>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Bytes),
                ColumnType::Boolean => row
                    .try_get_unchecked::<Option<bool>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Bool),
                ColumnType::Json => {
                    match row
                        .try_get_unchecked::<Option<String>, _>(name)
                        .map_err(decode_err)?
                    {
                        Some(text) => {
                            let json: serde_json::Value = serde_json::from_str(&text)?;
                            Some(FieldValue::from(json))
                        }
                        None => None,
                    }
                }
            };

            if let Some(value) = value {
                record.insert(name, value);
            }
        }
        Ok(record)
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn connect(config: &BackendConfig) -> StoreResult<Self> {
        let url = Self::normalize_url(config.effective_url());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Configuration(format!("Invalid SQLite URL {}: {}", url, e)))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout());

        if config.is_memory_database() {
            // Each connection would get its own empty database
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        } else if let Some(timeout) = config.socket_timeout() {
            pool_options = pool_options.idle_timeout(timeout);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to connect to SQLite: {}", e)))?;

        info!("Connected to SQLite at {}", url);
        Ok(Self::new(pool))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str, params: Vec<FieldValue>) -> StoreResult<u64> {
        let result = Self::bind_params(sql, params)?
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to execute statement: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn fetch(
        &self,
        sql: &str,
        params: Vec<FieldValue>,
        columns: &[Column],
    ) -> StoreResult<Vec<Record>> {
        let rows = Self::bind_params(sql, params)?
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to fetch records: {}", e)))?;

        rows.iter()
            .map(|row| Self::decode_row(row, columns))
            .collect()
    }

    async fn load_schema(&self, table: &str) -> StoreResult<Option<Schema>> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to read schema of {}: {}", table, e)))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get_unchecked("name")
                .map_err(|e| StoreError::Database(format!("Failed to read column name: {}", e)))?;
            let declared: String = row
                .try_get_unchecked("type")
                .map_err(|e| StoreError::Database(format!("Failed to read column type: {}", e)))?;
            match ColumnType::from_sql_name(&declared) {
                Some(ty) => columns.push(Column::new(name, ty)),
                None => warn!(
                    "Ignoring column {} of {} with unsupported type {}",
                    name, table, declared
                ),
            }
        }
        Schema::with_columns(table, columns).map(Some)
    }

    async fn add_column(&self, table: &str, column: &Column) -> StoreResult<()> {
        let sql = self.dialect.add_column_sql(table, column);
        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate column name") => {
                warn!("Column {} already exists in {}", column.name, table);
                Ok(())
            }
            Err(e) => Err(StoreError::Database(format!(
                "Failed to add column {} to {}: {}",
                column.name, table, e
            ))),
        }
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }
}
