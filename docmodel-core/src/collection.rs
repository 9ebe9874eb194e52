//! Typed collection façade.
//!
//! A [`ModelCollection`] binds one declared class to its namespace on a backend. Writes go
//! through the [`Serializer`] so nothing invalid reaches the store; reads are deserialized
//! with the class schema unless the call overrides it.
//!
//! # Relations
//!
//! Relations declared on the class can be resolved two ways:
//!
//! - `lookup`: the read becomes an aggregation that joins the target collection on the
//!   server.
//! - `populate`: after the read, one follow-up find per parent fetches the related
//!   documents, which are deserialized with the target's schema and assigned to the parent.
//!
//! # Example
//!
//! ```ignore
//! let posts = source.collection::<Post>().await?;
//!
//! posts.insert_one(&post).await?;
//! let with_author = posts
//!     .find(doc! { "title": "Hello" }, FindOptions::new().lookup("author"))
//!     .await?;
//! ```

use bson::{Bson, Document, de::deserialize_from_bson, doc};
use serde::de::DeserializeOwned;
use std::{
    fmt::{self, Debug},
    marker::PhantomData,
    sync::Arc,
};
use tracing::debug;

use crate::{
    backend::{
        DeleteResult, FindAndModifyOptions, InsertManyResult, InsertOneResult, Namespace,
        QueryOptions, StoreBackend, UpdateResult,
    },
    catalog::Catalog,
    error::DocModelResult,
    field::SimpleType,
    index::IndexDeclaration,
    model::{ClassSchema, Model},
    query::IntoFilter,
    relation::{RelationKind, RelationResolver},
    schema::{PropertyMask, Schema},
    serializer::{DeserializeOptions, Serializer},
};

/// Options of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Cursor options. Merged over the ones carried by the filter.
    pub query: QueryOptions,
    /// How results are deserialized.
    pub read: DeserializeOptions,
    /// Relation properties joined on the server.
    pub lookup: Vec<String>,
    /// Relation properties fetched with follow-up queries.
    pub populate: Vec<String>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.query.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Deserializes results with `schema` instead of the class schema.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.read = self.read.schema(schema);
        self
    }

    pub fn simple_type(mut self, simple_type: impl Into<SimpleType>) -> Self {
        self.read = self.read.simple_type(simple_type);
        self
    }

    /// Returns stored documents untransformed.
    pub fn raw(mut self) -> Self {
        self.read = self.read.raw();
        self
    }

    pub fn mask(mut self, mask: PropertyMask) -> Self {
        self.read = self.read.mask(mask);
        self
    }

    pub fn lookup(mut self, property: impl Into<String>) -> Self {
        self.lookup.push(property.into());
        self
    }

    pub fn populate(mut self, property: impl Into<String>) -> Self {
        self.populate.push(property.into());
        self
    }
}

impl From<DeserializeOptions> for FindOptions {
    fn from(read: DeserializeOptions) -> Self {
        Self { read, ..Self::default() }
    }
}

/// Options of `update_*` and `replace_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

fn merge(mut base: QueryOptions, overrides: QueryOptions) -> QueryOptions {
    if overrides.sort.is_some() {
        base.sort = overrides.sort;
    }
    if overrides.skip.is_some() {
        base.skip = overrides.skip;
    }
    if overrides.limit.is_some() {
        base.limit = overrides.limit;
    }
    if overrides.projection.is_some() {
        base.projection = overrides.projection;
    }
    base
}

/// A class bound to its collection on a backend.
pub struct ModelCollection<T, B> {
    catalog: Arc<Catalog>,
    backend: Arc<B>,
    ns: Namespace,
    default_database: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, B> Clone for ModelCollection<T, B> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            backend: Arc::clone(&self.backend),
            ns: self.ns.clone(),
            default_database: self.default_database.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, B: Debug> Debug for ModelCollection<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCollection")
            .field("class", &std::any::type_name::<T>())
            .field("namespace", &self.ns)
            .field("backend", &self.backend)
            .finish()
    }
}

impl<T: Model, B: StoreBackend> ModelCollection<T, B> {
    pub(crate) fn new(
        catalog: Arc<Catalog>,
        backend: Arc<B>,
        ns: Namespace,
        default_database: Option<String>,
    ) -> Self {
        Self {
            catalog,
            backend,
            ns,
            default_database,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn name(&self) -> &str {
        &self.ns.collection
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The class schema of `T`.
    pub fn class(&self) -> DocModelResult<&ClassSchema> {
        self.catalog.collection_schema::<T>()
    }

    fn serializer(&self) -> Serializer<'_> {
        Serializer::new(&self.catalog)
    }

    fn serialize(&self, model: &T) -> DocModelResult<Document> {
        self.serializer().serialize_model(model, &PropertyMask::default())
    }

    pub async fn insert_one(&self, model: &T) -> DocModelResult<InsertOneResult> {
        let document = self.serialize(model)?;

        debug!(collection = %self.ns, "insert_one");
        self.backend.insert_one(&self.ns, document).await
    }

    pub async fn insert_many(&self, models: &[T]) -> DocModelResult<InsertManyResult> {
        let documents = models
            .iter()
            .map(|model| self.serialize(model))
            .collect::<DocModelResult<Vec<_>>>()?;

        debug!(collection = %self.ns, count = documents.len(), "insert_many");
        self.backend.insert_many(&self.ns, documents).await
    }

    /// Finds the matching models.
    pub async fn find(
        &self,
        filter: impl IntoFilter,
        options: FindOptions,
    ) -> DocModelResult<Vec<T>> {
        self.find_as(filter, options).await
    }

    /// Finds the matching documents and converts them into `R`.
    ///
    /// # Errors
    ///
    /// Besides backend and validation failures, fails with
    /// [`DocModelError::Serialization`](crate::error::DocModelError::Serialization) when the
    /// applied schema belongs to a class other than `R`.
    pub async fn find_as<R: DeserializeOwned + 'static>(
        &self,
        filter: impl IntoFilter,
        options: FindOptions,
    ) -> DocModelResult<Vec<R>> {
        let class = self.class()?;
        self.serializer().check_target::<R>(&options.read, Some(&class.schema))?;

        self.find_documents(filter, options)
            .await?
            .into_iter()
            .map(|value| Ok(deserialize_from_bson(value)?))
            .collect()
    }

    /// Finds the matching documents, deserialized as requested but not converted.
    pub async fn find_documents(
        &self,
        filter: impl IntoFilter,
        options: FindOptions,
    ) -> DocModelResult<Vec<Bson>> {
        let (filter, carried) = filter.into_filter()?;
        let query = merge(carried, options.query.clone());

        let stored = if options.lookup.is_empty() {
            debug!(collection = %self.ns, filter = %filter, "find");
            self.backend.find(&self.ns, filter, query).await?
        } else {
            let pipeline = self.lookup_pipeline(filter, query, &options.lookup)?;

            debug!(collection = %self.ns, pipeline = ?pipeline, "find with lookup");
            self.backend.aggregate(&self.ns, pipeline).await?
        };

        self.read(stored, &options).await
    }

    pub async fn find_one(
        &self,
        filter: impl IntoFilter,
        options: FindOptions,
    ) -> DocModelResult<Option<T>> {
        self.find_one_as(filter, options).await
    }

    pub async fn find_one_as<R: DeserializeOwned + 'static>(
        &self,
        filter: impl IntoFilter,
        options: FindOptions,
    ) -> DocModelResult<Option<R>> {
        let class = self.class()?;
        self.serializer().check_target::<R>(&options.read, Some(&class.schema))?;

        match self.find_one_document(filter, options).await? {
            Some(value) => Ok(Some(deserialize_from_bson(value)?)),
            None => Ok(None),
        }
    }

    pub async fn find_one_document(
        &self,
        filter: impl IntoFilter,
        options: FindOptions,
    ) -> DocModelResult<Option<Bson>> {
        let (filter, carried) = filter.into_filter()?;
        let query = merge(carried, options.query.clone());

        let stored = if options.lookup.is_empty() {
            debug!(collection = %self.ns, filter = %filter, "find_one");
            self.backend.find_one(&self.ns, filter, query).await?
        } else {
            let pipeline = self.lookup_pipeline(filter, query.limit(1), &options.lookup)?;

            debug!(collection = %self.ns, pipeline = ?pipeline, "find_one with lookup");
            self.backend.aggregate(&self.ns, pipeline).await?.into_iter().next()
        };

        Ok(self.read(stored.into_iter().collect(), &options).await?.into_iter().next())
    }

    /// Applies a native update document to the first matching document.
    pub async fn update_one(
        &self,
        filter: impl IntoFilter,
        update: Document,
        options: UpdateOptions,
    ) -> DocModelResult<UpdateResult> {
        let (filter, _) = filter.into_filter()?;

        debug!(collection = %self.ns, filter = %filter, update = %update, "update_one");
        self.backend.update_one(&self.ns, filter, update, options.upsert).await
    }

    pub async fn update_many(
        &self,
        filter: impl IntoFilter,
        update: Document,
        options: UpdateOptions,
    ) -> DocModelResult<UpdateResult> {
        let (filter, _) = filter.into_filter()?;

        debug!(collection = %self.ns, filter = %filter, update = %update, "update_many");
        self.backend.update_many(&self.ns, filter, update, options.upsert).await
    }

    /// Replaces the first matching document with the serialized `model`.
    pub async fn replace_one(
        &self,
        filter: impl IntoFilter,
        model: &T,
        options: UpdateOptions,
    ) -> DocModelResult<UpdateResult> {
        let (filter, _) = filter.into_filter()?;
        let replacement = self.serialize(model)?;

        debug!(collection = %self.ns, filter = %filter, "replace_one");
        self.backend.replace_one(&self.ns, filter, replacement, options.upsert).await
    }

    pub async fn delete_one(&self, filter: impl IntoFilter) -> DocModelResult<DeleteResult> {
        let (filter, _) = filter.into_filter()?;

        debug!(collection = %self.ns, filter = %filter, "delete_one");
        self.backend.delete_one(&self.ns, filter).await
    }

    pub async fn delete_many(&self, filter: impl IntoFilter) -> DocModelResult<DeleteResult> {
        let (filter, _) = filter.into_filter()?;

        debug!(collection = %self.ns, filter = %filter, "delete_many");
        self.backend.delete_many(&self.ns, filter).await
    }

    pub async fn find_one_and_delete(&self, filter: impl IntoFilter) -> DocModelResult<Option<T>> {
        self.find_one_and_delete_as(filter, DeserializeOptions::new()).await
    }

    /// Deletes the first matching document and returns it read with `read`.
    pub async fn find_one_and_delete_as<R: DeserializeOwned + 'static>(
        &self,
        filter: impl IntoFilter,
        read: DeserializeOptions,
    ) -> DocModelResult<Option<R>> {
        let (filter, _) = filter.into_filter()?;
        self.check_read::<R>(&read)?;

        debug!(collection = %self.ns, filter = %filter, "find_one_and_delete");
        let stored = self.backend.find_one_and_delete(&self.ns, filter).await?;
        self.convert(stored, &read)
    }

    pub async fn find_one_and_replace(
        &self,
        filter: impl IntoFilter,
        model: &T,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<T>> {
        self.find_one_and_replace_as(filter, model, options, DeserializeOptions::new())
            .await
    }

    pub async fn find_one_and_replace_as<R: DeserializeOwned + 'static>(
        &self,
        filter: impl IntoFilter,
        model: &T,
        options: FindAndModifyOptions,
        read: DeserializeOptions,
    ) -> DocModelResult<Option<R>> {
        let (filter, _) = filter.into_filter()?;
        let replacement = self.serialize(model)?;
        self.check_read::<R>(&read)?;

        debug!(collection = %self.ns, filter = %filter, "find_one_and_replace");
        let stored = self
            .backend
            .find_one_and_replace(&self.ns, filter, replacement, options)
            .await?;
        self.convert(stored, &read)
    }

    pub async fn find_one_and_update(
        &self,
        filter: impl IntoFilter,
        update: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<T>> {
        self.find_one_and_update_as(filter, update, options, DeserializeOptions::new())
            .await
    }

    /// Applies `update` to the first matching document and returns the document selected
    /// by `options`, read with `read`.
    pub async fn find_one_and_update_as<R: DeserializeOwned + 'static>(
        &self,
        filter: impl IntoFilter,
        update: Document,
        options: FindAndModifyOptions,
        read: DeserializeOptions,
    ) -> DocModelResult<Option<R>> {
        let (filter, _) = filter.into_filter()?;
        self.check_read::<R>(&read)?;

        debug!(collection = %self.ns, filter = %filter, update = %update, "find_one_and_update");
        let stored = self
            .backend
            .find_one_and_update(&self.ns, filter, update, options)
            .await?;
        self.convert(stored, &read)
    }

    /// Runs an aggregation pipeline and returns the raw results.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> DocModelResult<Vec<Document>> {
        debug!(collection = %self.ns, pipeline = ?pipeline, "aggregate");
        self.backend.aggregate(&self.ns, pipeline).await
    }

    /// Runs an aggregation pipeline and converts the results into `R`.
    ///
    /// Results are deserialized only with a schema or type given in `options`, since a
    /// pipeline rarely produces documents of the class's shape.
    pub async fn aggregate_as<R: DeserializeOwned + 'static>(
        &self,
        pipeline: Vec<Document>,
        options: DeserializeOptions,
    ) -> DocModelResult<Vec<R>> {
        let serializer = self.serializer();

        self.aggregate(pipeline)
            .await?
            .iter()
            .map(|document| serializer.deserialize_into(document, &options, None))
            .collect()
    }

    pub async fn count_documents(&self, filter: impl IntoFilter) -> DocModelResult<u64> {
        let (filter, _) = filter.into_filter()?;

        debug!(collection = %self.ns, filter = %filter, "count_documents");
        self.backend.count_documents(&self.ns, filter).await
    }

    pub async fn distinct(
        &self,
        field: &str,
        filter: impl IntoFilter,
    ) -> DocModelResult<Vec<Bson>> {
        let (filter, _) = filter.into_filter()?;

        debug!(collection = %self.ns, field, filter = %filter, "distinct");
        self.backend.distinct(&self.ns, field, filter).await
    }

    /// Creates an index on the collection and returns its name.
    pub async fn create_index(&self, index: &IndexDeclaration) -> DocModelResult<String> {
        debug!(collection = %self.ns, keys = %index.keys(), "create_index");
        self.backend
            .create_index(&self.ns, index.keys().clone(), index.options().clone())
            .await
    }

    pub async fn drop(&self) -> DocModelResult<()> {
        debug!(collection = %self.ns, "drop");
        self.backend.drop_collection(&self.ns).await
    }

    /// Renames the collection. The returned handle addresses the new name.
    pub async fn rename(self, new_name: &str) -> DocModelResult<Self> {
        debug!(collection = %self.ns, new_name, "rename");
        self.backend.rename_collection(&self.ns, new_name).await?;

        let ns = self.ns.sibling(new_name);
        Ok(Self { ns, ..self })
    }

    fn lookup_pipeline(
        &self,
        filter: Document,
        query: QueryOptions,
        lookup: &[String],
    ) -> DocModelResult<Vec<Document>> {
        let class = self.class()?;
        let mut pipeline = vec![doc! { "$match": filter }];

        if let Some(sort) = query.sort {
            pipeline.push(doc! { "$sort": sort });
        }
        if let Some(skip) = query.skip {
            pipeline.push(doc! { "$skip": skip as i64 });
        }
        if let Some(limit) = query.limit {
            pipeline.push(doc! { "$limit": limit });
        }

        pipeline.extend(RelationResolver::new(&self.catalog, class).lookup(lookup)?);

        if let Some(projection) = query.projection {
            pipeline.push(doc! { "$project": projection });
        }
        Ok(pipeline)
    }

    async fn read(
        &self,
        stored: Vec<Document>,
        options: &FindOptions,
    ) -> DocModelResult<Vec<Bson>> {
        let class = self.class()?;
        let serializer = self.serializer();

        let mut values = stored
            .iter()
            .map(|document| serializer.deserialize(document, &options.read, Some(&class.schema)))
            .collect::<DocModelResult<Vec<_>>>()?;

        for property in &options.populate {
            self.populate(&mut values, class, property, options.read.deserialize)
                .await?;
        }
        Ok(values)
    }

    async fn populate(
        &self,
        parents: &mut [Bson],
        class: &ClassSchema,
        property: &str,
        deserialize: bool,
    ) -> DocModelResult<()> {
        let plan = RelationResolver::new(&self.catalog, class).populate(property)?;
        let ns = plan.target.namespace(self.default_database.as_deref())?;
        let serializer = self.serializer();
        let target = Some(&plan.target.schema);
        let read = if deserialize {
            DeserializeOptions::new()
        } else {
            DeserializeOptions::new().raw()
        };

        for parent in parents.iter_mut() {
            let Bson::Document(parent) = parent else {
                continue;
            };
            let Some(filter) = plan
                .relation
                .populate_filter(parent.get(plan.relation.local_field.as_str()))
            else {
                continue;
            };

            debug!(collection = %ns, filter = %filter, property, "populate");
            let related = match plan.relation.kind {
                RelationKind::OneToOne => {
                    match self.backend.find_one(&ns, filter, QueryOptions::default()).await? {
                        Some(document) => serializer.deserialize(&document, &read, target)?,
                        None => Bson::Null,
                    }
                }
                RelationKind::OneToMany => Bson::Array(
                    self.backend
                        .find(&ns, filter, QueryOptions::default())
                        .await?
                        .iter()
                        .map(|document| serializer.deserialize(document, &read, target))
                        .collect::<DocModelResult<Vec<_>>>()?,
                ),
            };

            parent.insert(property, related);
        }
        Ok(())
    }

    /// Rejects a read target before the store is modified.
    fn check_read<R: 'static>(&self, read: &DeserializeOptions) -> DocModelResult<()> {
        let class = self.class()?;
        self.serializer().check_target::<R>(read, Some(&class.schema))
    }

    fn convert<R: DeserializeOwned + 'static>(
        &self,
        stored: Option<Document>,
        read: &DeserializeOptions,
    ) -> DocModelResult<Option<R>> {
        let class = self.class()?;

        stored
            .map(|document| {
                self.serializer()
                    .deserialize_into(&document, read, Some(&class.schema))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_options_override_carried_ones() {
        let carried = QueryOptions::new().limit(5).skip(1);
        let merged = merge(carried, QueryOptions::new().limit(10));

        assert_eq!(merged.limit, Some(10));
        assert_eq!(merged.skip, Some(1));
    }

    #[test]
    fn find_options_collect_relations() {
        let options = FindOptions::new().lookup("author").populate("comments").raw();

        assert_eq!(options.lookup, vec!["author"]);
        assert_eq!(options.populate, vec!["comments"]);
        assert!(!options.read.deserialize);
    }
}
