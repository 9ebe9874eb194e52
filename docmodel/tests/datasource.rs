use async_trait::async_trait;
use docmodel::{
    backend::CreateCollectionOptions,
    memory::{AdminEvent, InMemoryConnector, InMemoryStore},
    prelude::*,
};
use futures::future::join_all;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(collection = "users", validate)]
struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[index(unique)]
    email: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(collection = "kept", sync = "never")]
struct Kept {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(collection = "filled", sync = "if_not_exists")]
struct Filled {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(collection = "replaced", sync = "override", validation_action = "warn")]
struct Replaced {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
struct Unbound {
    name: String,
}

fn catalog() -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    catalog.declare::<User>().unwrap();
    catalog.declare::<Kept>().unwrap();
    catalog.declare::<Filled>().unwrap();
    catalog.declare::<Replaced>().unwrap();
    catalog.declare::<Unbound>().unwrap();
    Arc::new(catalog)
}

fn source(store: &InMemoryStore, options: DataSourceOptions) -> DataSource<InMemoryConnector> {
    DataSource::new(InMemoryConnector::with_store(store.clone()), options, catalog())
}

fn users() -> Namespace {
    Namespace::new("app", "users")
}

#[tokio::test]
async fn registration_installs_validator_and_indexes_once() {
    let store = InMemoryStore::new();
    let source = source(&store, DataSourceOptions::new().database("app"));

    source.collection::<User>().await.unwrap();
    source.collection::<User>().await.unwrap();
    source.register::<User>().await.unwrap();

    assert_eq!(
        store.events().await,
        vec![
            AdminEvent::CreateCollection(users()),
            AdminEvent::CreateIndex(users(), "email_1".to_string()),
        ]
    );

    let validator = store.validator(&users()).await.unwrap();
    let schema = validator.get_document("$jsonSchema").unwrap();
    assert_eq!(schema.get_str("bsonType").unwrap(), "object");
    let required = vec![Bson::from("email"), Bson::from("name")];
    assert_eq!(schema.get_array("required").unwrap(), &required);

    let indexes = store.indexes(&users()).await;
    assert!(indexes.iter().any(|index| index.name == "email_1" && index.unique));
}

#[tokio::test]
async fn concurrent_registrations_run_side_effects_once() {
    let store = InMemoryStore::new();
    let source = source(&store, DataSourceOptions::new().database("app"));

    let results = join_all((0..8).map(|_| source.register::<User>())).await;
    assert!(results.iter().all(Result::is_ok));

    assert_eq!(store.events().await.len(), 2);
}

#[tokio::test]
async fn register_all_covers_every_bound_class() {
    let store = InMemoryStore::new();
    let source = source(&store, DataSourceOptions::new().database("app").auto_index(false));

    source.register_all().await.unwrap();

    let mut created = store
        .events()
        .await
        .into_iter()
        .map(|event| match event {
            AdminEvent::CreateCollection(ns) => ns.collection,
            other => panic!("unexpected event {:?}", other),
        })
        .collect::<Vec<_>>();
    created.sort();

    assert_eq!(created, vec!["filled", "kept", "replaced", "users"]);
}

#[tokio::test]
async fn sync_strategy_decides_whether_existing_validators_change() {
    let store = InMemoryStore::new();
    let existing = doc! { "$jsonSchema": { "bsonType": "object" } };

    for name in ["kept", "replaced"] {
        store
            .create_collection(
                &Namespace::new("app", name),
                CreateCollectionOptions {
                    validator: Some(existing.clone()),
                    ..CreateCollectionOptions::default()
                },
            )
            .await
            .unwrap();
    }
    store
        .create_collection(&Namespace::new("app", "filled"), CreateCollectionOptions::default())
        .await
        .unwrap();

    let source = source(&store, DataSourceOptions::new().database("app"));
    source.register::<Kept>().await.unwrap();
    source.register::<Filled>().await.unwrap();
    source.register::<Replaced>().await.unwrap();

    let kept = store.validator(&Namespace::new("app", "kept")).await;
    assert_eq!(kept, Some(existing.clone()));

    let filled = store.validator(&Namespace::new("app", "filled")).await.unwrap();
    assert!(filled.get_document("$jsonSchema").unwrap().contains_key("properties"));

    let replaced = store.validator(&Namespace::new("app", "replaced")).await.unwrap();
    assert_ne!(replaced, existing);

    let set = store
        .events()
        .await
        .into_iter()
        .filter_map(|event| match event {
            AdminEvent::SetValidator(ns) => Some(ns.collection),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(set, vec!["filled", "replaced"]);
}

#[tokio::test]
async fn index_failures_do_not_fail_registration() {
    let store = InMemoryStore::new();
    store
        .insert_many(
            &users(),
            vec![
                doc! { "email": "a@example.com", "name": "a" },
                doc! { "email": "a@example.com", "name": "b" },
            ],
        )
        .await
        .unwrap();

    let source = source(&store, DataSourceOptions::new().database("app"));
    source.register::<User>().await.unwrap();
    assert!(!store.indexes(&users()).await.iter().any(|index| index.name == "email_1"));
}

#[tokio::test]
async fn auto_connect_disabled_requires_connect() {
    let store = InMemoryStore::new();
    let source = source(&store, DataSourceOptions::new().database("app").auto_connect(false));

    let err = source.collection::<User>().await.unwrap_err();
    assert_eq!(err, DocModelError::NotConnected);

    source.connect().await.unwrap();
    assert!(source.collection::<User>().await.is_ok());
}

#[tokio::test]
async fn collections_need_a_binding_and_a_database() {
    let store = InMemoryStore::new();

    let err = source(&store, DataSourceOptions::new().database("app"))
        .collection::<Unbound>()
        .await
        .unwrap_err();
    assert_eq!(err, DocModelError::NotACollection("Unbound".to_string()));

    let err = source(&store, DataSourceOptions::new())
        .collection::<User>()
        .await
        .unwrap_err();
    assert!(matches!(err, DocModelError::Configuration(_)));

    let from_url = source(&store, DataSourceOptions::new().url("mongodb://localhost:27017/shop"));
    let collection = from_url.collection::<User>().await.unwrap();
    assert_eq!(collection.namespace(), &Namespace::new("shop", "users"));
}

#[derive(Debug, Default)]
struct CountingConnector {
    store: InMemoryStore,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

#[async_trait]
impl Connector for CountingConnector {
    type Backend = InMemoryStore;

    async fn connect(&self, _options: &DataSourceOptions) -> DocModelResult<Self::Backend> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(DocModelError::Connection("connection refused".to_string()));
        }
        Ok(self.store.clone())
    }
}

fn counting(failing: bool) -> DataSource<CountingConnector> {
    let connector = CountingConnector::default();
    connector.failing.store(failing, Ordering::SeqCst);

    DataSource::new(connector, DataSourceOptions::new().database("app"), catalog())
}

#[tokio::test]
async fn concurrent_callers_share_one_connection_attempt() {
    let source = Arc::new(counting(false));

    let handles = (0..5)
        .map(|_| {
            let source = Arc::clone(&source);
            tokio::spawn(async move { source.collection::<User>().await.map(|_| ()) })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let backend = source.connect().await.unwrap();
    assert_eq!(backend.events().await.len(), 2);
    assert_eq!(source_attempts(&source), 1);
}

fn source_attempts(source: &DataSource<CountingConnector>) -> usize {
    source.connector().attempts.load(Ordering::SeqCst)
}

#[tokio::test]
async fn failed_attempts_stay_failed_until_reconnect() {
    let source = counting(true);

    let results = join_all((0..3).map(|_| source.connect())).await;
    assert!(results.iter().all(|result| matches!(result, Err(DocModelError::Connection(_)))));

    assert!(source.connect().await.is_err());
    assert_eq!(source_attempts(&source), 1);

    assert!(source.reconnect().await.is_err());
    assert_eq!(source_attempts(&source), 2);
}

#[tokio::test]
async fn close_disconnects_and_the_next_use_connects_again() {
    let source = counting(false);

    source.connect().await.unwrap();
    source.close().await.unwrap();
    source.close().await.unwrap();

    source.backend().await.unwrap();
    assert_eq!(source_attempts(&source), 2);
}

#[tokio::test]
async fn close_waits_for_an_attempt_in_flight() {
    let source = Arc::new(counting(false));

    let connecting = {
        let source = Arc::clone(&source);
        tokio::spawn(async move { source.connect().await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    source.close().await.unwrap();
    connecting.await.unwrap().unwrap();

    assert_eq!(source.connector().store.events().await, vec![AdminEvent::Shutdown]);
    assert_eq!(source_attempts(&source), 1);
}

#[tokio::test]
async fn close_discards_a_failed_attempt() {
    let source = counting(true);

    assert!(source.connect().await.is_err());
    source.close().await.unwrap();

    assert!(source.connector().store.events().await.is_empty());
    assert!(source.connect().await.is_err());
    assert_eq!(source_attempts(&source), 2);
}
