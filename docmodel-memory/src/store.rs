//! In-memory storage implementation.
//!
//! Documents live in insertion order per namespace, behind an async-aware read-write lock.
//! Collection metadata (validators and indexes) is kept alongside and reported back the
//! way a server would, but validators are not enforced.

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

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

use crate::{
    evaluator::{FilterEvaluator, compare, distinct, resolve, same},
    pipeline::{aggregate, project},
    update::{apply, is_operator_update, seed},
};

/// An index as recorded by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
    pub options: Document,
}

/// Collection management calls received by an [`InMemoryStore`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminEvent {
    CreateCollection(Namespace),
    SetValidator(Namespace),
    CreateIndex(Namespace, String),
    DropCollection(Namespace),
    RenameCollection(Namespace, String),
    Shutdown,
}

#[derive(Debug, Clone, Default)]
struct CollectionState {
    documents: Vec<Document>,
    validator: Option<Document>,
    validation_level: Option<ValidationLevel>,
    validation_action: Option<ValidationAction>,
    indexes: Vec<IndexInfo>,
}

impl CollectionState {
    fn id_index() -> IndexInfo {
        IndexInfo {
            name: "_id_".to_string(),
            keys: doc! { "_id": 1 },
            unique: true,
            options: Document::new(),
        }
    }

    fn new() -> Self {
        Self {
            indexes: vec![Self::id_index()],
            ..Self::default()
        }
    }

    fn index_key(document: &Document, keys: &Document) -> Vec<Bson> {
        keys.keys()
            .map(|path| resolve(document, path).into_iter().next().cloned().unwrap_or(Bson::Null))
            .collect()
    }

    /// Fails if `candidate` collides with a stored document (other than `skip`) on a
    /// unique index.
    fn check_unique(
        &self,
        ns: &Namespace,
        candidate: &Document,
        skip: Option<usize>,
    ) -> DocModelResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = Self::index_key(candidate, &index.keys);

            let collides = self.documents.iter().enumerate().any(|(position, stored)| {
                Some(position) != skip
                    && Self::index_key(stored, &index.keys)
                        .iter()
                        .zip(&key)
                        .all(|(a, b)| same(a, b))
            });

            if collides {
                return Err(DocModelError::Backend(format!(
                    "E11000 duplicate key error collection: {} index: {} dup key: {}",
                    ns,
                    index.name,
                    Bson::Array(key)
                )));
            }
        }
        Ok(())
    }

    fn positions(&self, filter: &Document, sort: Option<&Document>) -> DocModelResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if FilterEvaluator::new(document).matches(filter)? {
                positions.push(position);
            }
        }

        if let Some(sort) = sort {
            positions.sort_by(|a, b| compare(&self.documents[*a], &self.documents[*b], sort));
        }
        Ok(positions)
    }

    fn insert(&mut self, ns: &Namespace, mut document: Document) -> DocModelResult<Bson> {
        if !document.contains_key("_id") {
            let mut with_id = doc! { "_id": ObjectId::new() };
            with_id.extend(document);
            document = with_id;
        }
        self.check_unique(ns, &document, None)?;

        let id = document.get("_id").cloned().unwrap_or(Bson::Null);
        self.documents.push(document);
        Ok(id)
    }

    fn replace_at(
        &mut self,
        ns: &Namespace,
        position: usize,
        mut replacement: Document,
    ) -> DocModelResult<bool> {
        let current = &self.documents[position];
        if let Some(id) = current.get("_id") {
            match replacement.get("_id") {
                Some(new_id) if !same(id, new_id) => {
                    return Err(DocModelError::Backend(
                        "the (immutable) field '_id' was found to have been altered".to_string(),
                    ));
                }
                Some(_) => {}
                None => {
                    let mut with_id = doc! { "_id": id.clone() };
                    with_id.extend(replacement);
                    replacement = with_id;
                }
            }
        }
        self.check_unique(ns, &replacement, Some(position))?;

        let modified = self.documents[position] != replacement;
        self.documents[position] = replacement;
        Ok(modified)
    }

    fn update_at(
        &mut self,
        ns: &Namespace,
        position: usize,
        update: &Document,
    ) -> DocModelResult<bool> {
        let mut updated = self.documents[position].clone();

        if is_operator_update(update) {
            apply(&mut updated, update)?;
        } else {
            return self.replace_at(ns, position, update.clone());
        }
        self.check_unique(ns, &updated, Some(position))?;

        let modified = self.documents[position] != updated;
        self.documents[position] = updated;
        Ok(modified)
    }

    fn upsert(
        &mut self,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocModelResult<Bson> {
        let document = if is_operator_update(update) {
            let mut document = seed(filter)?;
            apply(&mut document, update)?;
            document
        } else {
            let mut document = update.clone();
            if let (None, Some(id)) = (document.get("_id"), filter.get("_id")) {
                if !matches!(id, Bson::Document(_)) {
                    document.insert("_id", id.clone());
                }
            }
            document
        };

        self.insert(ns, document)
    }

    fn update(
        &mut self,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        upsert: bool,
        many: bool,
    ) -> DocModelResult<UpdateResult> {
        let mut positions = self.positions(filter, None)?;
        if !many {
            positions.truncate(1);
        }

        if positions.is_empty() {
            let upserted_id = if upsert {
                Some(self.upsert(ns, filter, update)?)
            } else {
                None
            };
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id,
            });
        }

        let mut result = UpdateResult {
            matched_count: positions.len() as u64,
            ..UpdateResult::default()
        };
        for position in positions {
            if self.update_at(ns, position, update)? {
                result.modified_count += 1;
            }
        }
        Ok(result)
    }
}

type StoreMap = HashMap<Namespace, CollectionState>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones share
/// the same underlying data.
///
/// # Performance
///
/// Queries scan every document of a collection. That is fine for development and tests;
/// use a persistent backend for anything larger.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::{Namespace, QueryOptions, StoreBackend};
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///     let ns = Namespace::new("app", "users");
///
///     store.insert_one(&ns, doc! { "name": "Alice", "age": 30 }).await?;
///     let found = store.find(&ns, doc! { "age": { "$gte": 18 } }, QueryOptions::default()).await?;
///     assert_eq!(found.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
    events: Arc<RwLock<Vec<AdminEvent>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, event: AdminEvent) {
        self.events.write().await.push(event);
    }

    /// Collection management calls received so far.
    pub async fn events(&self) -> Vec<AdminEvent> {
        self.events.read().await.clone()
    }

    /// The validator currently set on `ns`.
    pub async fn validator(&self, ns: &Namespace) -> Option<Document> {
        self.store
            .read()
            .await
            .get(ns)
            .and_then(|state| state.validator.clone())
    }

    /// The indexes of `ns`, starting with the `_id` index.
    pub async fn indexes(&self, ns: &Namespace) -> Vec<IndexInfo> {
        self.store
            .read()
            .await
            .get(ns)
            .map(|state| state.indexes.clone())
            .unwrap_or_default()
    }

    /// All documents of `ns`, in insertion order.
    pub async fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(ns)
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    fn select(
        state: &CollectionState,
        filter: &Document,
        options: &QueryOptions,
    ) -> DocModelResult<Vec<Document>> {
        let positions = state.positions(filter, options.sort.as_ref())?;
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        positions
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|position| {
                let document = &state.documents[position];
                match &options.projection {
                    Some(projection) => project(document, projection),
                    None => Ok(document.clone()),
                }
            })
            .collect()
    }

    async fn find_and_modify(
        &self,
        ns: &Namespace,
        filter: Document,
        change: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>> {
        let mut store = self.store.write().await;
        let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

        let position = state.positions(&filter, options.sort.as_ref())?.into_iter().next();
        match position {
            Some(position) => {
                let before = state.documents[position].clone();
                state.update_at(ns, position, &change)?;

                Ok(Some(match options.return_document {
                    ReturnDocument::Before => before,
                    ReturnDocument::After => state.documents[position].clone(),
                }))
            }
            None if options.upsert => {
                state.upsert(ns, &filter, &change)?;

                Ok(match options.return_document {
                    ReturnDocument::Before => None,
                    ReturnDocument::After => state.documents.last().cloned(),
                })
            }
            None => Ok(None),
        }
    }
}

fn needs_operators() -> DocModelError {
    DocModelError::Backend("update document requires atomic operators".to_string())
}

fn no_operators() -> DocModelError {
    DocModelError::Backend("replacement document must not contain atomic operators".to_string())
}

fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, spec)| match spec {
            Bson::String(kind) => format!("{}_{}", field, kind),
            Bson::Int32(n) => format!("{}_{}", field, n),
            Bson::Int64(n) => format!("{}_{}", field, n),
            other => format!("{}_{}", field, other),
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(
        &self,
        ns: &Namespace,
        document: Document,
    ) -> DocModelResult<InsertOneResult> {
        let mut store = self.store.write().await;
        let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

        let inserted_id = state.insert(ns, document)?;
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> DocModelResult<InsertManyResult> {
        let mut store = self.store.write().await;
        let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            inserted_ids.push(state.insert(ns, document)?);
        }
        Ok(InsertManyResult { inserted_ids })
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> DocModelResult<Vec<Document>> {
        let store = self.store.read().await;
        match store.get(ns) {
            Some(state) => Self::select(state, &filter, &options),
            None => Ok(Vec::new()),
        }
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> DocModelResult<Option<Document>> {
        let options = options.limit(1);
        Ok(self.find(ns, filter, options).await?.into_iter().next())
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult> {
        if !is_operator_update(&update) {
            return Err(needs_operators());
        }
        let mut store = self.store.write().await;
        let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

        state.update(ns, &filter, &update, upsert, false)
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult> {
        if !is_operator_update(&update) {
            return Err(needs_operators());
        }
        let mut store = self.store.write().await;
        let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

        state.update(ns, &filter, &update, upsert, true)
    }

    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> DocModelResult<UpdateResult> {
        if is_operator_update(&replacement) {
            return Err(no_operators());
        }
        let mut store = self.store.write().await;
        let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

        state.update(ns, &filter, &replacement, upsert, false)
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> DocModelResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(ns) else {
            return Ok(DeleteResult::default());
        };

        match state.positions(&filter, None)?.first() {
            Some(position) => {
                state.documents.remove(*position);
                Ok(DeleteResult { deleted_count: 1 })
            }
            None => Ok(DeleteResult::default()),
        }
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> DocModelResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(ns) else {
            return Ok(DeleteResult::default());
        };

        let positions = state.positions(&filter, None)?;
        for position in positions.iter().rev() {
            state.documents.remove(*position);
        }
        Ok(DeleteResult { deleted_count: positions.len() as u64 })
    }

    async fn find_one_and_delete(
        &self,
        ns: &Namespace,
        filter: Document,
    ) -> DocModelResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(ns) else {
            return Ok(None);
        };

        let position = state.positions(&filter, None)?.into_iter().next();
        Ok(position.map(|position| state.documents.remove(position)))
    }

    async fn find_one_and_replace(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>> {
        if is_operator_update(&replacement) {
            return Err(no_operators());
        }
        self.find_and_modify(ns, filter, replacement, options).await
    }

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> DocModelResult<Option<Document>> {
        if !is_operator_update(&update) {
            return Err(needs_operators());
        }
        self.find_and_modify(ns, filter, update, options).await
    }

    async fn aggregate(
        &self,
        ns: &Namespace,
        pipeline: Vec<Document>,
    ) -> DocModelResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = store
            .get(ns)
            .map(|state| state.documents.clone())
            .unwrap_or_default();

        aggregate(documents, &pipeline, |collection| {
            store
                .get(&ns.sibling(collection))
                .map(|state| state.documents.iter().collect())
                .unwrap_or_default()
        })
    }

    async fn count_documents(&self, ns: &Namespace, filter: Document) -> DocModelResult<u64> {
        let store = self.store.read().await;
        match store.get(ns) {
            Some(state) => Ok(state.positions(&filter, None)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn distinct(
        &self,
        ns: &Namespace,
        field: &str,
        filter: Document,
    ) -> DocModelResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(state) = store.get(ns) else {
            return Ok(Vec::new());
        };

        let matched = FilterEvaluator::filter_documents(&state.documents, &filter)?;
        Ok(distinct(matched, field))
    }

    async fn create_index(
        &self,
        ns: &Namespace,
        keys: Document,
        options: Document,
    ) -> DocModelResult<String> {
        if keys.is_empty() {
            return Err(DocModelError::Backend("index keys cannot be empty".to_string()));
        }
        let name = match options.get_str("name") {
            Ok(name) => name.to_string(),
            Err(_) => index_name(&keys),
        };
        let unique = options.get_bool("unique").unwrap_or(false);

        {
            let mut store = self.store.write().await;
            let state = store.entry(ns.clone()).or_insert_with(CollectionState::new);

            if let Some(existing) = state.indexes.iter().find(|index| index.name == name) {
                if existing.keys != keys || existing.unique != unique {
                    return Err(DocModelError::Backend(format!(
                        "An existing index has the same name as the requested index: {}",
                        name
                    )));
                }
            } else {
                let index = IndexInfo {
                    name: name.clone(),
                    keys,
                    unique,
                    options,
                };
                if unique {
                    let mut probe = CollectionState {
                        indexes: vec![index.clone()],
                        ..CollectionState::default()
                    };
                    for document in &state.documents {
                        probe.check_unique(ns, document, None)?;
                        probe.documents.push(document.clone());
                    }
                }
                state.indexes.push(index);
            }
        }

        self.record(AdminEvent::CreateIndex(ns.clone(), name.clone())).await;
        Ok(name)
    }

    async fn list_collections(&self, database: &str) -> DocModelResult<Vec<CollectionInfo>> {
        let store = self.store.read().await;
        let mut collections = store
            .iter()
            .filter(|(ns, _)| ns.database == database)
            .map(|(ns, state)| CollectionInfo {
                name: ns.collection.clone(),
                validator: state.validator.clone(),
            })
            .collect::<Vec<_>>();

        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }

    async fn create_collection(
        &self,
        ns: &Namespace,
        options: CreateCollectionOptions,
    ) -> DocModelResult<()> {
        {
            let mut store = self.store.write().await;
            if store.contains_key(ns) {
                return Err(DocModelError::Backend(format!("Collection {} already exists.", ns)));
            }

            store.insert(
                ns.clone(),
                CollectionState {
                    validator: options.validator,
                    validation_level: options.validation_level,
                    validation_action: options.validation_action,
                    ..CollectionState::new()
                },
            );
        }

        self.record(AdminEvent::CreateCollection(ns.clone())).await;
        Ok(())
    }

    async fn set_validator(
        &self,
        ns: &Namespace,
        validator: Document,
        level: ValidationLevel,
        action: ValidationAction,
    ) -> DocModelResult<()> {
        {
            let mut store = self.store.write().await;
            let Some(state) = store.get_mut(ns) else {
                return Err(DocModelError::Backend(format!("ns does not exist: {}", ns)));
            };

            state.validator = Some(validator);
            state.validation_level = Some(level);
            state.validation_action = Some(action);
        }

        self.record(AdminEvent::SetValidator(ns.clone())).await;
        Ok(())
    }

    async fn drop_collection(&self, ns: &Namespace) -> DocModelResult<()> {
        self.store.write().await.remove(ns);
        self.record(AdminEvent::DropCollection(ns.clone())).await;
        Ok(())
    }

    async fn rename_collection(&self, ns: &Namespace, new_name: &str) -> DocModelResult<()> {
        {
            let mut store = self.store.write().await;
            let target = ns.sibling(new_name);

            if store.contains_key(&target) {
                return Err(DocModelError::Backend(format!("target namespace exists: {}", target)));
            }
            let Some(state) = store.remove(ns) else {
                let message = format!("source namespace does not exist: {}", ns);
                return Err(DocModelError::Backend(message));
            };
            store.insert(target, state);
        }

        self.record(AdminEvent::RenameCollection(ns.clone(), new_name.to_string())).await;
        Ok(())
    }

    async fn shutdown(&self) -> DocModelResult<()> {
        self.record(AdminEvent::Shutdown).await;
        Ok(())
    }
}

/// Hands out an [`InMemoryStore`]. Every backend it connects shares the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    store: InMemoryStore,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose backends share `store`.
    pub fn with_store(store: InMemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    type Backend = InMemoryStore;

    async fn connect(&self, _options: &DataSourceOptions) -> DocModelResult<Self::Backend> {
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("app", "users")
    }

    #[tokio::test]
    async fn inserts_generate_ids_and_reject_duplicates() {
        let store = InMemoryStore::new();

        let inserted = store.insert_one(&ns(), doc! { "name": "ada" }).await.unwrap();
        assert!(matches!(inserted.inserted_id, Bson::ObjectId(_)));

        store.insert_one(&ns(), doc! { "_id": 1, "name": "bob" }).await.unwrap();
        let err = store.insert_one(&ns(), doc! { "_id": 1 }).await.unwrap_err();
        assert!(err.to_string().contains("E11000"));
    }

    #[tokio::test]
    async fn finds_with_sort_skip_limit_and_projection() {
        let store = InMemoryStore::new();
        for (id, age) in [(1, 30), (2, 20), (3, 40)] {
            store.insert_one(&ns(), doc! { "_id": id, "age": age, "x": true }).await.unwrap();
        }

        let found = store
            .find(
                &ns(),
                doc! { "age": { "$gte": 20 } },
                QueryOptions::new()
                    .sort(doc! { "age": -1 })
                    .skip(1)
                    .limit(1)
                    .projection(doc! { "age": 1 }),
            )
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "_id": 1, "age": 30 }]);
    }

    #[tokio::test]
    async fn updates_and_upserts() {
        let store = InMemoryStore::new();
        store.insert_one(&ns(), doc! { "_id": 1, "n": 1 }).await.unwrap();

        let result = store
            .update_one(&ns(), doc! { "_id": 1 }, doc! { "$inc": { "n": 1 } }, false)
            .await
            .unwrap();
        assert_eq!((result.matched_count, result.modified_count), (1, 1));

        let result = store
            .update_one(&ns(), doc! { "_id": 2 }, doc! { "$set": { "n": 5 } }, true)
            .await
            .unwrap();
        assert_eq!(result.upserted_id, Some(Bson::Int32(2)));

        assert!(store.update_one(&ns(), doc! {}, doc! { "n": 1 }, false).await.is_err());
        assert_eq!(
            store.documents(&ns()).await,
            vec![doc! { "_id": 1, "n": 2 }, doc! { "_id": 2, "n": 5 }]
        );
    }

    #[tokio::test]
    async fn find_and_modify_returns_requested_version() {
        let store = InMemoryStore::new();
        store.insert_one(&ns(), doc! { "_id": 1, "n": 1 }).await.unwrap();

        let before = store
            .find_one_and_update(
                &ns(),
                doc! { "_id": 1 },
                doc! { "$set": { "n": 2 } },
                FindAndModifyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(before, Some(doc! { "_id": 1, "n": 1 }));

        let after = store
            .find_one_and_replace(
                &ns(),
                doc! { "_id": 1 },
                doc! { "n": 3 },
                FindAndModifyOptions {
                    return_document: ReturnDocument::After,
                    ..FindAndModifyOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(after, Some(doc! { "_id": 1, "n": 3 }));

        let deleted = store.find_one_and_delete(&ns(), doc! { "n": 3 }).await.unwrap();
        assert_eq!(deleted, Some(doc! { "_id": 1, "n": 3 }));
        assert_eq!(store.count_documents(&ns(), doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unique_indexes_are_enforced() {
        let store = InMemoryStore::new();
        let name = store
            .create_index(&ns(), doc! { "email": 1 }, doc! { "unique": true })
            .await
            .unwrap();
        assert_eq!(name, "email_1");

        store.insert_one(&ns(), doc! { "email": "a@x" }).await.unwrap();
        assert!(store.insert_one(&ns(), doc! { "email": "a@x" }).await.is_err());
        assert_eq!(store.indexes(&ns()).await.len(), 2);
    }

    #[tokio::test]
    async fn manages_collections_and_validators() {
        let store = InMemoryStore::new();
        let validator = doc! { "$jsonSchema": { "bsonType": "object" } };

        store
            .create_collection(
                &ns(),
                CreateCollectionOptions {
                    validator: Some(validator.clone()),
                    ..CreateCollectionOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(store.create_collection(&ns(), CreateCollectionOptions::default()).await.is_err());

        let listed = store.list_collections("app").await.unwrap();
        let users = CollectionInfo { name: "users".into(), validator: Some(validator) };
        assert_eq!(listed, vec![users]);

        store.rename_collection(&ns(), "people").await.unwrap();
        assert!(store.list_collections("app").await.unwrap()[0].name == "people");

        assert_eq!(
            store.events().await,
            vec![
                AdminEvent::CreateCollection(ns()),
                AdminEvent::RenameCollection(ns(), "people".into()),
            ]
        );
    }

    #[tokio::test]
    async fn distinct_and_delete() {
        let store = InMemoryStore::new();
        store
            .insert_many(&ns(), vec![doc! { "t": "a" }, doc! { "t": "b" }, doc! { "t": "a" }])
            .await
            .unwrap();

        assert_eq!(store.distinct(&ns(), "t", doc! {}).await.unwrap().len(), 2);
        assert_eq!(store.delete_many(&ns(), doc! { "t": "a" }).await.unwrap().deleted_count, 2);
        assert_eq!(store.delete_one(&ns(), doc! {}).await.unwrap().deleted_count, 1);
    }
}
