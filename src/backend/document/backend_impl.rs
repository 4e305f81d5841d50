use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, Collection};
use tracing::{debug, info};

use super::convert::{
    filter_to_document, from_document, id_to_string, normalize_id, search_document, to_bson,
    to_document, to_stored_document,
};
use crate::backend::{
    Backend, BackendConfig, BackendKind, Capabilities, DeleteResult, RecordStore, SelectOptions,
    UpdateResult, DOC_LIMIT,
};
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldValue, Record, ID_FIELD};
use crate::parser::{Filter, SortSpec};

const APP_NAME: &str = "docstore-bridge";

/// MongoDB record store
///
/// Filters, sorting, updates and upserts map directly onto the driver's
/// native operations. The client is internally pooled and shared by all
/// callers.
pub struct DocumentStore {
    client: Client,
}

impl DocumentStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, db: &str, collection: &str) -> Collection<Document> {
        self.client.database(db).collection::<Document>(collection)
    }

    fn sort_document(sort: &SortSpec) -> Option<Document> {
        if !sort.is_sorted() {
            return None;
        }
        let mut document = Document::new();
        document.insert(sort.field.as_str(), sort.order.direction());
        Some(document)
    }

    fn set_document(fields: &Record) -> StoreResult<Document> {
        if fields.is_empty() {
            return Err(StoreError::InvalidArgument(
                "An update needs at least one field".to_string(),
            ));
        }
        Ok(doc! { "$set": to_document(fields) })
    }

    fn list_document(operator: &str, list_field: &str, item: &FieldValue) -> Document {
        let mut target = Document::new();
        target.insert(list_field, to_bson(item));
        let mut document = Document::new();
        document.insert(operator, target);
        document
    }

    async fn find_records(
        &self,
        db: &str,
        collection: &str,
        filter: Document,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Record>> {
        if options.limit == 0 {
            return Ok(Vec::new());
        }
        debug!("find {}.{} {}", db, collection, filter);

        let coll = self.collection(db, collection);
        let mut action = coll
            .find(filter)
            .limit(options.limit.min(i64::MAX as u64) as i64);
        if let Some(sort) = Self::sort_document(&options.sort) {
            action = action.sort(sort);
        }
        if !options.projection.is_empty() {
            let mut projection = Document::new();
            for field in &options.projection {
                projection.insert(field.as_str(), 1);
            }
            action = action.projection(projection);
        }

        let documents: Vec<Document> = action
            .await
            .map_err(|e| StoreError::Database(format!("Failed to query {}: {}", collection, e)))?
            .try_collect()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to read {}: {}", collection, e)))?;

        Ok(documents
            .into_iter()
            .map(|document| {
                let mut record = from_document(document);
                normalize_id(&mut record, options.no_id);
                options.apply_exclusions(&mut record);
                record
            })
            .collect())
    }

    async fn update_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        update: Document,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        let filter = filter_to_document(filter)?;
        debug!("update {}.{} {} {}", db, collection, filter, update);
        let result = self
            .collection(db, collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to update {}: {}", collection, e)))?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id.as_ref().map(id_to_string),
        })
    }
}

#[async_trait]
impl Backend for DocumentStore {
    async fn connect(config: &BackendConfig) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(config.effective_url())
            .await
            .map_err(|e| StoreError::Configuration(format!("Invalid MongoDB URL: {}", e)))?;
        options.app_name = Some(APP_NAME.to_string());
        options.max_pool_size = Some(config.max_connections);
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());
        // The driver has no socket timeout; idle connections are reaped instead
        options.max_idle_time = config.socket_timeout();

        let client = Client::with_options(options).map_err(|e| {
            StoreError::BackendUnavailable(format!("Failed to create MongoDB client: {}", e))
        })?;
        let store = Self::new(client);
        store
            .health_check()
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to reach MongoDB: {}", e)))?;

        info!("Connected to MongoDB ({:?})", config.locality);
        Ok(store)
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            list_fields: true,
            aggregate: true,
            search: true,
        }
    }
}

#[async_trait]
impl RecordStore for DocumentStore {
    async fn read_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        no_id: bool,
    ) -> StoreResult<Option<Record>> {
        let filter = filter_to_document(filter)?;
        let document = self
            .collection(db, collection)
            .find_one(filter)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to read {}: {}", collection, e)))?;

        Ok(document.map(|document| {
            let mut record = from_document(document);
            normalize_id(&mut record, no_id);
            record
        }))
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
        self.find_records(db, collection, Document::new(), &options)
            .await
    }

    async fn select(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Record>> {
        let filter = filter_to_document(filter)?;
        self.find_records(db, collection, filter, options).await
    }

    async fn fetch_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        no_id: bool,
    ) -> StoreResult<Option<Record>> {
        self.read_one(db, collection, &Filter::id(id.trim()), no_id)
            .await
    }

    async fn count(&self, db: &str, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let filter = filter_to_document(filter)?;
        self.collection(db, collection)
            .count_documents(filter)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to count {}: {}", collection, e)))
    }

    async fn create(
        &self,
        db: &str,
        collection: &str,
        record: &Record,
        with_date: bool,
    ) -> StoreResult<String> {
        let mut record = record.clone();
        if with_date {
            record.stamp_date();
        }
        let result = self
            .collection(db, collection)
            .insert_one(to_stored_document(&record))
            .await
            .map_err(|e| StoreError::Database(format!("Failed to insert into {}: {}", collection, e)))?;

        Ok(id_to_string(&result.inserted_id))
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
        let documents: Vec<Document> = records
            .iter()
            .map(|record| {
                let mut record = record.clone();
                if with_date {
                    record.stamp_date();
                }
                to_stored_document(&record)
            })
            .collect();

        let result = self
            .collection(db, collection)
            .insert_many(documents)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to insert into {}: {}", collection, e)))?;

        (0..records.len())
            .map(|index| {
                result
                    .inserted_ids
                    .get(&index)
                    .map(id_to_string)
                    .ok_or_else(|| {
                        StoreError::Database(format!("No id returned for record {}", index))
                    })
            })
            .collect()
    }

    async fn update(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        let update = Self::set_document(fields)?;
        self.update_one(db, collection, filter, update, upsert)
            .await
    }

    async fn update_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<UpdateResult> {
        let update = Self::set_document(fields)?;
        let filter = filter_to_document(filter)?;
        let result = self
            .collection(db, collection)
            .update_many(filter, update)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to update {}: {}", collection, e)))?;

        Ok(UpdateResult::new(result.matched_count, result.modified_count))
    }

    async fn upsert(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        fields: &Record,
    ) -> StoreResult<String> {
        let update = Self::set_document(fields)?;
        let filter = filter_to_document(filter)?;
        debug!("upsert {}.{} {} {}", db, collection, filter, update);
        let document = self
            .collection(db, collection)
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| StoreError::Database(format!("Failed to upsert into {}: {}", collection, e)))?;

        document
            .as_ref()
            .and_then(|document| document.get(ID_FIELD))
            .map(id_to_string)
            .ok_or_else(|| {
                StoreError::Database(format!("Upserted record not found in {}", collection))
            })
    }

    async fn delete(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult> {
        let filter = filter_to_document(filter)?;
        let result = self
            .collection(db, collection)
            .delete_one(filter)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to delete from {}: {}", collection, e)))?;

        Ok(DeleteResult::new(result.deleted_count))
    }

    async fn delete_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<DeleteResult> {
        let filter = filter_to_document(filter)?;
        let result = self
            .collection(db, collection)
            .delete_many(filter)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to delete from {}: {}", collection, e)))?;

        Ok(DeleteResult::new(result.deleted_count))
    }

    async fn delete_by_id(
        &self,
        db: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<DeleteResult> {
        self.delete(db, collection, &Filter::id(id.trim()))
            .await
    }

    async fn rename(
        &self,
        db: &str,
        collection: &str,
        name_map: &[(String, String)],
    ) -> StoreResult<()> {
        let mut renames = Document::new();
        for (old, new) in name_map {
            if old == ID_FIELD || new == ID_FIELD {
                return Err(StoreError::InvalidArgument(
                    "The identity field cannot be renamed".to_string(),
                ));
            }
            if old == new {
                return Err(StoreError::InvalidArgument(format!(
                    "Cannot rename '{}' to itself",
                    old
                )));
            }
            renames.insert(old.as_str(), new.as_str());
        }
        if renames.is_empty() {
            return Ok(());
        }

        self.collection(db, collection)
            .update_many(Document::new(), doc! { "$rename": renames })
            .await
            .map_err(|e| StoreError::Database(format!("Failed to rename fields in {}: {}", collection, e)))?;

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
        db: &str,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        item: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        let update = Self::list_document("$push", list_field, item);
        self.update_one(db, collection, filter, update, true).await
    }

    async fn delete_from_list(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        item: &FieldValue,
    ) -> StoreResult<UpdateResult> {
        let update = Self::list_document("$pull", list_field, item);
        self.update_one(db, collection, filter, update, true).await
    }

    async fn aggregate(
        &self,
        db: &str,
        collection: &str,
        pipeline: &[Record],
    ) -> StoreResult<Vec<Record>> {
        let stages: Vec<Document> = pipeline.iter().map(to_document).collect();
        let documents: Vec<Document> = self
            .collection(db, collection)
            .aggregate(stages)
            .allow_disk_use(true)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to aggregate {}: {}", collection, e)))?
            .try_collect()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to read {}: {}", collection, e)))?;

        Ok(documents
            .into_iter()
            .map(|document| {
                let mut record = from_document(document);
                normalize_id(&mut record, false);
                record
            })
            .collect())
    }

    async fn search(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        pattern: &str,
        active_only: bool,
    ) -> StoreResult<Vec<Record>> {
        let options = SelectOptions::new().with_limit(DOC_LIMIT);
        self.find_records(db, collection, search_document(field, pattern, active_only), &options)
            .await
    }
}
