//! The single entry point callers use for storage.
//!
//! A [`Dispatcher`] forwards each call to whichever adapter its
//! [`ConnectionManager`] connected, dialing on first use. It never interprets
//! filters or updates and passes errors through unchanged.

use std::sync::Arc;

use crate::backend::{
    BackendConfig, Capabilities, Connection, ConnectionManager, DeleteResult, SelectOptions,
    UpdateResult,
};
use crate::error::StoreResult;
use crate::models::{FieldValue, Record};
use crate::parser::{Filter, SortSpec};

#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<ConnectionManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Dispatcher that dials `config` on first use
    pub fn from_config(config: BackendConfig) -> Self {
        Self::new(Arc::new(ConnectionManager::new(config)))
    }

    /// Dispatcher over an existing connection, e.g. one shared with tests
    pub fn from_connection(config: BackendConfig, connection: Connection) -> Self {
        Self::new(Arc::new(ConnectionManager::with_connection(
            config, connection,
        )))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Connect if no connection exists yet; otherwise return the existing one
    pub async fn ensure_connected(&self) -> StoreResult<Connection> {
        self.manager.connect().await
    }

    pub async fn capabilities(&self) -> StoreResult<Capabilities> {
        Ok(self.ensure_connected().await?.capabilities())
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        self.ensure_connected().await?.store().health_check().await
    }

    /// Filter selecting the record whose identity is `id`
    pub fn create_id_filter(&self, id: &str) -> Filter {
        Filter::id(id)
    }

    pub async fn read_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        no_id: bool,
    ) -> StoreResult<Option<Record>> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .read_one(db, collection, filter, no_id)
            .await
    }

    pub async fn read(
        &self,
        db: &str,
        collection: &str,
        sort: &SortSpec,
        no_id: bool,
    ) -> StoreResult<Vec<Record>> {
        let connection = self.ensure_connected().await?;
        connection.store().read(db, collection, sort, no_id).await
    }

    pub async fn select(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Record>> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .select(db, collection, filter, options)
            .await
    }

    pub async fn fetch_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        no_id: bool,
    ) -> StoreResult<Option<Record>> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .fetch_by_id(db, collection, id, no_id)
            .await
    }

    pub async fn count(&self, db: &str, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let connection = self.ensure_connected().await?;
        connection.store().count(db, collection, filter).await
    }

    pub async fn create(
        &self,
        db: &str,
        collection: &str,
        record: &Record,
        with_date: bool,
    ) -> StoreResult<String> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .create(db, collection, record, with_date)
            .await
    }

    pub async fn create_many(
        &self,
        db: &str,
        collection: &str,
        records: &[Record],
        with_date: bool,
    ) -> StoreResult<Vec<String>> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .create_many(db, collection, records, with_date)
            .await
    }

    pub async fn update(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .update(db, collection, filter, fields, upsert)
            .await
    }

    pub async fn update_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<UpdateResult> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .update_many(db, collection, filter, fields)
            .await
    }

    pub async fn upsert(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<String> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .upsert(db, collection, filter, fields)
            .await
    }

    pub async fn delete(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult> {
        let connection = self.ensure_connected().await?;
        connection.store().delete(db, collection, filter).await
    }

    pub async fn delete_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult> {
        let connection = self.ensure_connected().await?;
        connection.store().delete_many(db, collection, filter).await
    }

    pub async fn delete_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<DeleteResult> {
        let connection = self.ensure_connected().await?;
        connection.store().delete_by_id(db, collection, id).await
    }

    pub async fn rename(
        &self,
        db: &str,
        collection: &str,
        name_map: &[(String, String)],
    ) -> StoreResult<()> {
        let connection = self.ensure_connected().await?;
        connection.store().rename(db, collection, name_map).await
    }

    pub async fn add_field_to_all(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .add_field_to_all(db, collection, field, value)
            .await
    }

    pub async fn append_to_list(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        item: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .append_to_list(db, collection, filter, list_field, item)
            .await
    }

    pub async fn delete_from_list(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        item: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .delete_from_list(db, collection, filter, list_field, item)
            .await
    }

    pub async fn aggregate(
        &self,
        db: &str,
        collection: &str,
        pipeline: &[Record],
    ) -> StoreResult<Vec<Record>> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .aggregate(db, collection, pipeline)
            .await
    }

    pub async fn search(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        pattern: &str,
        active_only: bool,
    ) -> StoreResult<Vec<Record>> {
        let connection = self.ensure_connected().await?;
        connection
            .store()
            .search(db, collection, field, pattern, active_only)
            .await
    }
}
