use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::backend::database::filter::SqlDialect;
use crate::backend::database::relational::{RelationalAdapter, SqlExecutor};
use crate::backend::database::schema::{Column, ColumnType, Schema};
use crate::backend::{BackendConfig, BackendKind};
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record};

/// PostgreSQL record store
///
/// Structured fields live in JSONB columns; everything else maps to a
/// native column type.
pub type PostgresStore = RelationalAdapter<PostgresExecutor>;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn column_type_name(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::BigInteger => "BIGINT",
            ColumnType::Text => "TEXT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Blob => "BYTEA",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Json => "JSONB",
        }
    }

    fn add_column_sql(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
            self.quote(table),
            self.quote(&column.name),
            self.column_type_name(column.ty)
        )
    }
}

pub struct PostgresExecutor {
    pool: PgPool,
    dialect: PostgresDialect,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dialect: PostgresDialect,
        }
    }

    /// Get the connection pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn bind_params<'q>(sql: &'q str, params: Vec<FieldValue>) -> StoreResult<PgQuery<'q>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                FieldValue::Null => query.bind(None::<String>),
                FieldValue::Bool(b) => query.bind(b),
                FieldValue::Int(i) => query.bind(i),
                FieldValue::Float(f) => query.bind(f),
                FieldValue::Text(s) => query.bind(s),
                FieldValue::Bytes(b) => query.bind(b),
                FieldValue::Object(r) => query.bind(r.to_json()),
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

    fn decode_row(row: &PgRow, columns: &[Column]) -> StoreResult<Record> {
        let mut record = Record::new();
        for column in columns {
            let name = column.name.as_str();
            let decode_err =
                |e: sqlx::Error| StoreError::Database(format!("Failed to decode {}: {}", name, e));

            let value = match column.ty {
                ColumnType::BigInteger => row
                    .try_get::<Option<i64>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Int),
                ColumnType::Text => row
                    .try_get::<Option<String>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Text),
                ColumnType::Float => row
                    .try_get::<Option<f64>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Float),
                ColumnType::Blob => row
                    .try_get::<Option<Vec<u8>>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Bytes),
                ColumnType::Boolean => row
                    .try_get::<Option<bool>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::Bool),
                ColumnType::Json => row
                    .try_get::<Option<serde_json::Value>, _>(name)
                    .map_err(decode_err)?
                    .map(FieldValue::from),
            };

            if let Some(value) = value {
                record.insert(name, value);
            }
        }
        Ok(record)
    }
}

#[async_trait]
impl SqlExecutor for PostgresExecutor {
    async fn connect(config: &BackendConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(config.socket_timeout())
            .connect(config.effective_url())
            .await
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        info!("Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::PostgreSql
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
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS name, data_type::text AS type
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
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
                .try_get("name")
                .map_err(|e| StoreError::Database(format!("Failed to read column name: {}", e)))?;
            let data_type: String = row
                .try_get("type")
                .map_err(|e| StoreError::Database(format!("Failed to read column type: {}", e)))?;
            match ColumnType::from_sql_name(&data_type) {
                Some(ty) => columns.push(Column::new(name, ty)),
                None => warn!(
                    "Ignoring column {} of {} with unsupported type {}",
                    name, table, data_type
                ),
            }
        }
        Schema::with_columns(table, columns).map(Some)
    }

    async fn add_column(&self, table: &str, column: &Column) -> StoreResult<()> {
        let sql = self.dialect.add_column_sql(table, column);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::Database(format!(
                    "Failed to add column {} to {}: {}",
                    column.name, table, e
                ))
            })?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(PostgresDialect.placeholder(1), "$1");
        assert_eq!(PostgresDialect.placeholder(12), "$12");
    }

    #[test]
    fn test_add_column_is_idempotent_sql() {
        let sql = PostgresDialect.add_column_sql("db_t", &Column::new("z", ColumnType::Float));
        assert_eq!(
            sql,
            r#"ALTER TABLE "db_t" ADD COLUMN IF NOT EXISTS "z" DOUBLE PRECISION"#
        );
    }

    #[test]
    fn test_rename_sql() {
        assert_eq!(
            PostgresDialect.rename_column_sql("db_t", "a", "b"),
            r#"ALTER TABLE "db_t" RENAME COLUMN "a" TO "b""#
        );
    }
}
