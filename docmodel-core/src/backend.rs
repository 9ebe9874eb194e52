//! Storage backend abstraction.
//!
//! This module defines the boundary to the document-store driver. Everything above it
//! (serialization, schema projection, relation resolution, collection binding) works in
//! terms of BSON documents and hands them to a [`StoreBackend`] addressed by [`Namespace`].
//!
//! # Traits
//!
//! - [`StoreBackend`]: per-collection reads, writes, aggregation and collection management
//! - [`Connector`]: factory that establishes a backend from data source options
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::{Namespace, QueryOptions, StoreBackend};
//! use bson::doc;
//!
//! let ns = Namespace::new("app", "users");
//! backend.insert_one(&ns, doc! { "name": "Alice" }).await?;
//! let found = backend.find(&ns, doc! { "name": "Alice" }, QueryOptions::default()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::{self, Debug, Display};

use crate::{
    config::DataSourceOptions,
    error::DocModelResult,
    model::{ValidationAction, ValidationLevel},
};

/// Fully qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Another collection in the same database.
    pub fn sibling(&self, collection: impl Into<String>) -> Self {
        Self::new(self.database.clone(), collection)
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Cursor options of a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Which version of the document a find-and-modify returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

/// Options of the find-and-modify operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    pub return_document: ReturnDocument,
    pub upsert: bool,
    pub sort: Option<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// A collection as reported by [`StoreBackend::list_collections`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    /// The collection's current validator, if one is set.
    pub validator: Option<Document>,
}

/// Options for [`StoreBackend::create_collection`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateCollectionOptions {
    pub validator: Option<Document>,
    pub validation_level: Option<ValidationLevel>,
    pub validation_action: Option<ValidationAction>,
}

/// Abstract interface for document storage backends.
///
/// Implementers provide the driver-level operations a collection binding needs. Filters,
/// updates and pipelines are native query documents; results are raw stored documents.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Driver failures are reported as [`DocModelError::Backend`](crate::error::DocModelError::Backend)
/// carrying the driver's message unchanged. Backends add no retries of their own.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a single document.
    ///
    /// # Returns
    ///
    /// The `_id` of the inserted document, generated by the backend if absent.
    async fn insert_one(
        &self,
        ns: &Namespace,
        document: Document,
    ) -> DocModelResult<InsertOneResult>;

    /// Inserts several documents in order.
    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> DocModelResult<InsertManyResult>;

    /// Returns all documents matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `ns` - The collection to query
    /// * `filter` - A native filter document
    /// * `options` - Sort, skip, limit and projection
    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> DocModelResult<Vec<Document>>;

    /// Returns the first document matching `filter`.
    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> DocModelResult<Option<Document>>;

    /// Applies `update` to the first matching document.
    ///
    /// # Arguments
    ///
    /// * `update` - An update document (`$set`, `$inc`, ...)
    /// * `upsert` - Insert a new document when nothing matches
    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult>;

    /// Applies `update` to every matching document.
    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult>;

    /// Replaces the first matching document.
    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult>;

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> DocModelResult<DeleteResult>;

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> DocModelResult<DeleteResult>;

    /// Deletes the first matching document and returns it.
    async fn find_one_and_delete(
        &self,
        ns: &Namespace,
        filter: Document,
    ) -> DocModelResult<Option<Document>>;

    /// Replaces the first matching document and returns it, before or after the change.
    async fn find_one_and_replace(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>>;

    /// Updates the first matching document and returns it, before or after the change.
    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        ns: &Namespace,
        pipeline: Vec<Document>,
    ) -> DocModelResult<Vec<Document>>;

    async fn count_documents(&self, ns: &Namespace, filter: Document) -> DocModelResult<u64>;

    /// Distinct values of `field` among the matching documents.
    async fn distinct(
        &self,
        ns: &Namespace,
        field: &str,
        filter: Document,
    ) -> DocModelResult<Vec<Bson>>;

    /// Creates an index and returns its name.
    ///
    /// # Arguments
    ///
    /// * `keys` - Field to direction/type map
    /// * `options` - Driver index options (`unique`, `name`, ...)
    async fn create_index(
        &self,
        ns: &Namespace,
        keys: Document,
        options: Document,
    ) -> DocModelResult<String>;

    /// Lists the collections of `database` with their validators.
    async fn list_collections(&self, database: &str) -> DocModelResult<Vec<CollectionInfo>>;

    /// Creates a collection, optionally with a validator.
    async fn create_collection(
        &self,
        ns: &Namespace,
        options: CreateCollectionOptions,
    ) -> DocModelResult<()>;

    /// Replaces the validator of an existing collection.
    async fn set_validator(
        &self,
        ns: &Namespace,
        validator: Document,
        level: ValidationLevel,
        action: ValidationAction,
    ) -> DocModelResult<()>;

    /// Drops a collection and all of its documents.
    async fn drop_collection(&self, ns: &Namespace) -> DocModelResult<()>;

    /// Renames a collection within its database.
    async fn rename_collection(&self, ns: &Namespace, new_name: &str) -> DocModelResult<()>;

    /// Releases the backend's resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> DocModelResult<()> {
        Ok(())
    }
}

/// Factory for [`StoreBackend`] instances.
///
/// A data source holds a connector and calls it at most once per connection attempt; the
/// resulting backend is shared by every collection of that data source.
#[async_trait]
pub trait Connector: Send + Sync + Debug + 'static {
    type Backend: StoreBackend + 'static;

    /// Establishes a backend.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Connection`](crate::error::DocModelError::Connection) if the
    /// store cannot be reached.
    async fn connect(&self, options: &DataSourceOptions) -> DocModelResult<Self::Backend>;
}
