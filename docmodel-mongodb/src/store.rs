use async_trait::async_trait;
use bson::{Bson, Document, de::deserialize_from_document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::Error as DriverError,
    options::{
        CreateCollectionOptions as DriverCreateOptions, FindOneOptions, FindOptions, IndexOptions,
        ReturnDocument as DriverReturnDocument, ValidationAction as DriverAction,
        ValidationLevel as DriverLevel,
    },
};
use docmodel_core::{
    backend::{
        CollectionInfo, Connector, CreateCollectionOptions, DeleteResult, FindAndModifyOptions,
        InsertManyResult, InsertOneResult, Namespace, QueryOptions, ReturnDocument, StoreBackend,
        UpdateResult,
    },
    config::DataSourceOptions,
    error::{DocModelError, DocModelResult},
    model::{ValidationAction, ValidationLevel},
};

fn driver_error(err: DriverError) -> DocModelError {
    DocModelError::Backend(err.to_string())
}

fn driver_level(level: ValidationLevel) -> DriverLevel {
    match level {
        ValidationLevel::Off => DriverLevel::Off,
        ValidationLevel::Strict => DriverLevel::Strict,
        ValidationLevel::Moderate => DriverLevel::Moderate,
    }
}

fn driver_action(action: ValidationAction) -> DriverAction {
    match action {
        ValidationAction::Error => DriverAction::Error,
        ValidationAction::Warn => DriverAction::Warn,
    }
}

fn driver_return(return_document: ReturnDocument) -> DriverReturnDocument {
    match return_document {
        ReturnDocument::Before => DriverReturnDocument::Before,
        ReturnDocument::After => DriverReturnDocument::After,
    }
}

/// [`StoreBackend`] over the official MongoDB driver.
///
/// Filters, updates and pipelines are handed to the server unchanged.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
}

impl MongoDbStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, ns: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(&ns.database)
            .collection(&ns.collection)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(
        &self,
        ns: &Namespace,
        document: Document,
    ) -> DocModelResult<InsertOneResult> {
        let result = self.get_collection(ns)
            .insert_one(document)
            .await
            .map_err(driver_error)?;

        Ok(InsertOneResult { inserted_id: result.inserted_id })
    }

    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> DocModelResult<InsertManyResult> {
        let result = self.get_collection(ns)
            .insert_many(documents)
            .await
            .map_err(driver_error)?;

        let mut inserted = result.inserted_ids.into_iter().collect::<Vec<_>>();
        inserted.sort_by_key(|(index, _)| *index);

        Ok(InsertManyResult {
            inserted_ids: inserted.into_iter().map(|(_, id)| id).collect(),
        })
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> DocModelResult<Vec<Document>> {
        let mut find_options = FindOptions::default();
        find_options.sort = options.sort;
        find_options.skip = options.skip;
        find_options.limit = options.limit;
        find_options.projection = options.projection;

        self.get_collection(ns)
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(driver_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(driver_error)
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> DocModelResult<Option<Document>> {
        let mut find_options = FindOneOptions::default();
        find_options.sort = options.sort;
        find_options.skip = options.skip;
        find_options.projection = options.projection;

        self.get_collection(ns)
            .find_one(filter)
            .with_options(find_options)
            .await
            .map_err(driver_error)
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult> {
        let result = self.get_collection(ns)
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult> {
        let result = self.get_collection(ns)
            .update_many(filter, update)
            .upsert(upsert)
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult> {
        let result = self.get_collection(ns)
            .replace_one(filter, replacement)
            .upsert(upsert)
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> DocModelResult<DeleteResult> {
        let result = self.get_collection(ns)
            .delete_one(filter)
            .await
            .map_err(driver_error)?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> DocModelResult<DeleteResult> {
        let result = self.get_collection(ns)
            .delete_many(filter)
            .await
            .map_err(driver_error)?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn find_one_and_delete(
        &self,
        ns: &Namespace,
        filter: Document,
    ) -> DocModelResult<Option<Document>> {
        self.get_collection(ns)
            .find_one_and_delete(filter)
            .await
            .map_err(driver_error)
    }

    async fn find_one_and_replace(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>> {
        let collection = self.get_collection(ns);
        let action = collection
            .find_one_and_replace(filter, replacement)
            .return_document(driver_return(options.return_document))
            .upsert(options.upsert);

        match options.sort {
            Some(sort) => action.sort(sort).await,
            None => action.await,
        }
        .map_err(driver_error)
    }

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>> {
        let collection = self.get_collection(ns);
        let action = collection
            .find_one_and_update(filter, update)
            .return_document(driver_return(options.return_document))
            .upsert(options.upsert);

        match options.sort {
            Some(sort) => action.sort(sort).await,
            None => action.await,
        }
        .map_err(driver_error)
    }

    async fn aggregate(
        &self,
        ns: &Namespace,
        pipeline: Vec<Document>,
    ) -> DocModelResult<Vec<Document>> {
        self.get_collection(ns)
            .aggregate(pipeline)
            .await
            .map_err(driver_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(driver_error)
    }

    async fn count_documents(&self, ns: &Namespace, filter: Document) -> DocModelResult<u64> {
        self.get_collection(ns)
            .count_documents(filter)
            .await
            .map_err(driver_error)
    }

    async fn distinct(
        &self,
        ns: &Namespace,
        field: &str,
        filter: Document,
    ) -> DocModelResult<Vec<Bson>> {
        self.get_collection(ns)
            .distinct(field, filter)
            .await
            .map_err(driver_error)
    }

    async fn create_index(
        &self,
        ns: &Namespace,
        keys: Document,
        options: Document,
    ) -> DocModelResult<String> {
        let index_options = deserialize_from_document::<IndexOptions>(options)?;

        let result = self.get_collection(ns)
            .create_index(
                IndexModel::builder()
                .keys(keys)
                .options(index_options)
                .build()
            )
            .await
            .map_err(driver_error)?;

        Ok(result.index_name)
    }

    async fn list_collections(&self, database: &str) -> DocModelResult<Vec<CollectionInfo>> {
        Ok(
            self.client
                .database(database)
                .list_collections()
                .await
                .map_err(driver_error)?
                .try_collect::<Vec<_>>()
                .await
                .map_err(driver_error)?
                .into_iter()
                .map(|spec| CollectionInfo {
                    name: spec.name,
                    validator: spec.options.validator,
                })
                .collect()
        )
    }

    async fn create_collection(
        &self,
        ns: &Namespace,
        options: CreateCollectionOptions,
    ) -> DocModelResult<()> {
        let mut create_options = DriverCreateOptions::default();
        create_options.validator = options.validator;
        create_options.validation_level = options.validation_level.map(driver_level);
        create_options.validation_action = options.validation_action.map(driver_action);

        self.client
            .database(&ns.database)
            .create_collection(&ns.collection)
            .with_options(create_options)
            .await
            .map_err(driver_error)?;

        Ok(())
    }

    async fn set_validator(
        &self,
        ns: &Namespace,
        validator: Document,
        level: ValidationLevel,
        action: ValidationAction,
    ) -> DocModelResult<()> {
        self.client
            .database(&ns.database)
            .run_command(doc! {
                "collMod": ns.collection.as_str(),
                "validator": validator,
                "validationLevel": level.as_str(),
                "validationAction": action.as_str(),
            })
            .await
            .map_err(driver_error)?;

        Ok(())
    }

    async fn drop_collection(&self, ns: &Namespace) -> DocModelResult<()> {
        self.get_collection(ns)
            .drop()
            .await
            .map_err(driver_error)?;

        Ok(())
    }

    async fn rename_collection(&self, ns: &Namespace, new_name: &str) -> DocModelResult<()> {
        self.client
            .database("admin")
            .run_command(doc! {
                "renameCollection": ns.to_string(),
                "to": ns.sibling(new_name).to_string(),
            })
            .await
            .map_err(driver_error)?;

        Ok(())
    }

    async fn shutdown(&self) -> DocModelResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Connects a [`MongoDbStore`] from [`DataSourceOptions::connect_url`].
///
/// The connection is verified with a `ping` before the store is handed out.
#[derive(Debug, Clone, Default)]
pub struct MongoDbConnector;

impl MongoDbConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MongoDbConnector {
    type Backend = MongoDbStore;

    async fn connect(&self, options: &DataSourceOptions) -> DocModelResult<Self::Backend> {
        let client = Client::with_uri_str(options.connect_url())
            .await
            .map_err(|e| DocModelError::Connection(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocModelError::Connection(e.to_string()))?;

        Ok(MongoDbStore::new(client))
    }
}
