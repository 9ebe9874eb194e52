use docmodel::{
    backend::{FindAndModifyOptions, ReturnDocument},
    memory::{AdminEvent, InMemoryConnector, InMemoryStore},
    prelude::*,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "authors")]
struct Author {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    #[field(default = 0)]
    karma: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[relation(foreign_field = "author_id")]
    articles: Option<Vec<Article>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "articles")]
struct Article {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
    author_id: ObjectId,
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "comments")]
struct Comment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    body: String,
    article_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[relation(local_field = "article_id")]
    article: Option<Article>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Headline {
    title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "drafts")]
struct Draft {
    #[field(required = true)]
    title: Option<String>,
}

fn source(store: &InMemoryStore) -> DataSource<InMemoryConnector> {
    let mut catalog = Catalog::new();
    catalog.declare::<Author>().unwrap();
    catalog.declare::<Comment>().unwrap();
    catalog.declare::<Draft>().unwrap();

    DataSource::new(
        InMemoryConnector::with_store(store.clone()),
        DataSourceOptions::new().database("blog"),
        Arc::new(catalog),
    )
}

fn author(name: &str) -> Author {
    Author { id: None, name: name.to_string(), karma: 0, articles: None }
}

fn article(title: &str, author_id: ObjectId, tags: &[&str]) -> Article {
    Article {
        id: None,
        title: title.to_string(),
        author_id,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

fn object_id(id: &Bson) -> ObjectId {
    id.as_object_id().unwrap()
}

#[tokio::test]
async fn insert_and_find_models() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();

    authors
        .insert_many(&[author("ada"), author("grace"), author("linus")])
        .await
        .unwrap();

    let found = authors
        .find(
            Query::builder()
                .filter(Filter::ne("name", "linus"))
                .sort("name", SortDirection::Desc)
                .build(),
            FindOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        found.iter().map(|author| author.name.as_str()).collect::<Vec<_>>(),
        vec!["grace", "ada"]
    );
    assert!(found.iter().all(|author| author.id.is_some()));

    let one = authors
        .find_one(doc! { "name": "linus" }, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one.name, "linus");

    assert_eq!(authors.count_documents(doc! {}).await.unwrap(), 3);
    assert_eq!(
        authors.count_documents(Filter::starts_with("name", "g")).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn invalid_models_never_reach_the_store() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let drafts = source.collection::<Draft>().await.unwrap();

    let err = drafts.insert_one(&Draft { title: None }).await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.to_string(), "title is required");
    assert!(store.documents(drafts.namespace()).await.is_empty());
}

#[tokio::test]
async fn undeclared_properties_are_dropped_on_read() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();

    store
        .insert_one(authors.namespace(), doc! { "name": "ada", "karma": 3, "secret": "x" })
        .await
        .unwrap();

    let found = authors
        .find_one_document(doc! {}, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    let found = found.as_document().unwrap();
    assert!(found.contains_key("_id"));
    assert!(!found.contains_key("secret"));

    let raw = authors
        .find_one_document(doc! {}, FindOptions::new().raw())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.as_document().unwrap().get_str("secret").unwrap(), "x");
}

#[tokio::test]
async fn updates_and_deletes() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();

    authors.insert_many(&[author("ada"), author("grace")]).await.unwrap();

    let result = authors
        .update_one(
            doc! { "name": "ada" },
            doc! { "$inc": { "karma": 5 } },
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.matched_count, 1);

    let updated = authors
        .find_one_and_update(
            doc! { "name": "grace" },
            doc! { "$set": { "karma": 7 } },
            FindAndModifyOptions {
                return_document: ReturnDocument::After,
                ..FindAndModifyOptions::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.karma, 7);

    let upserted = authors
        .update_one(
            doc! { "name": "linus" },
            doc! { "$set": { "karma": 1 } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();
    assert!(upserted.upserted_id.is_some());

    let mut karma = authors.distinct("karma", doc! {}).await.unwrap();
    karma.sort_by_key(|value| value.as_i32());
    assert_eq!(karma, vec![Bson::Int32(1), Bson::Int32(5), Bson::Int32(7)]);

    let replaced = authors
        .replace_one(
            doc! { "name": "linus" },
            &Author { karma: 2, ..author("torvalds") },
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(replaced.modified_count, 1);
    let torvalds = authors.find_one(doc! { "name": "torvalds" }, FindOptions::new()).await;
    assert!(torvalds.unwrap().is_some());

    let deleted = authors.find_one_and_delete(doc! { "name": "ada" }).await.unwrap().unwrap();
    assert_eq!(deleted.karma, 5);

    let deleted = authors.delete_many(Filter::gte("karma", 2)).await.unwrap();
    assert_eq!(deleted.deleted_count, 2);
    assert_eq!(authors.count_documents(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn lookup_joins_related_documents() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();
    let articles = source.collection::<Article>().await.unwrap();
    let comments = source.collection::<Comment>().await.unwrap();

    let ada = object_id(&authors.insert_one(&author("ada")).await.unwrap().inserted_id);
    let intro = object_id(
        &articles
            .insert_one(&article("Intro", ada, &["rust"]))
            .await
            .unwrap()
            .inserted_id,
    );
    comments
        .insert_one(&Comment {
            id: None,
            body: "nice".to_string(),
            article_id: intro,
            article: None,
        })
        .await
        .unwrap();

    let found = comments
        .find_one(doc! {}, FindOptions::new().lookup("article"))
        .await
        .unwrap()
        .unwrap();
    let joined = found.article.unwrap();
    assert_eq!(joined.title, "Intro");
    assert_eq!(joined.id, Some(intro));

    let err = comments
        .find(doc! {}, FindOptions::new().lookup("body"))
        .await
        .unwrap_err();
    assert!(matches!(err, DocModelError::Relation(_)));
}

#[tokio::test]
async fn populate_fetches_related_documents() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();
    let articles = source.collection::<Article>().await.unwrap();

    let ada = object_id(&authors.insert_one(&author("ada")).await.unwrap().inserted_id);
    let grace = object_id(&authors.insert_one(&author("grace")).await.unwrap().inserted_id);
    articles
        .insert_many(&[
            article("Engines", ada, &["math"]),
            article("Notes", ada, &["math", "history"]),
            article("Cobol", grace, &[]),
        ])
        .await
        .unwrap();

    let found = authors
        .find(doc! {}, FindOptions::new().sort(doc! { "name": 1 }).populate("articles"))
        .await
        .unwrap();

    let titles = found
        .iter()
        .map(|author| {
            author
                .articles
                .iter()
                .flatten()
                .map(|article| article.title.as_str())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    assert_eq!(titles, vec![vec!["Engines", "Notes"], vec!["Cobol"]]);
}

#[tokio::test]
async fn reads_can_target_other_types() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();
    let articles = source.collection::<Article>().await.unwrap();

    let ada = object_id(&authors.insert_one(&author("ada")).await.unwrap().inserted_id);
    articles.insert_one(&article("Engines", ada, &["math"])).await.unwrap();

    let err = articles
        .find_as::<Author>(doc! {}, FindOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DocModelError::Serialization(_)));

    let headlines = articles
        .find_as::<Headline>(
            doc! {},
            FindOptions::new().schema(Schema::object().property("title", Schema::string())),
        )
        .await
        .unwrap();
    assert_eq!(headlines, vec![Headline { title: "Engines".to_string() }]);

    let tags = articles
        .aggregate_as::<Headline>(
            vec![doc! { "$project": { "_id": 0, "title": 1 } }],
            DeserializeOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(tags, headlines);
}

#[tokio::test]
async fn find_and_modify_honours_read_options() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let authors = source.collection::<Author>().await.unwrap();

    store
        .insert_one(authors.namespace(), doc! { "name": "ada", "karma": 3, "secret": "x" })
        .await
        .unwrap();

    let raw = authors
        .find_one_and_update_as::<Document>(
            doc! { "name": "ada" },
            doc! { "$inc": { "karma": 1 } },
            FindAndModifyOptions {
                return_document: ReturnDocument::After,
                ..FindAndModifyOptions::default()
            },
            DeserializeOptions::new().raw(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get_str("secret").unwrap(), "x");
    assert_eq!(raw.get_i32("karma").unwrap(), 4);

    let err = authors
        .find_one_and_update_as::<Headline>(
            doc! { "name": "ada" },
            doc! { "$inc": { "karma": 1 } },
            FindAndModifyOptions::default(),
            DeserializeOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocModelError::Serialization(_)));
    let stored = store.documents(authors.namespace()).await;
    assert_eq!(stored[0].get_i32("karma").unwrap(), 4);

    let deleted = authors
        .find_one_and_delete_as::<Document>(
            doc! { "name": "ada" },
            DeserializeOptions::new().schema(Schema::object().property("name", Schema::string())),
        )
        .await
        .unwrap();
    assert_eq!(deleted, Some(doc! { "name": "ada" }));
    assert!(store.documents(authors.namespace()).await.is_empty());
}

#[tokio::test]
async fn collection_management() {
    let store = InMemoryStore::new();
    let source = source(&store);
    let articles = source.collection::<Article>().await.unwrap();

    let name = articles
        .create_index(&IndexDeclaration::compound([("author_id", 1), ("title", -1)]).unwrap())
        .await
        .unwrap();
    assert_eq!(name, "author_id_1_title_-1");

    let renamed = articles.rename("posts").await.unwrap();
    assert_eq!(renamed.name(), "posts");
    renamed.drop().await.unwrap();

    assert_eq!(
        store.events().await,
        vec![
            AdminEvent::CreateIndex(Namespace::new("blog", "articles"), name),
            AdminEvent::RenameCollection(Namespace::new("blog", "articles"), "posts".to_string()),
            AdminEvent::DropCollection(Namespace::new("blog", "posts")),
        ]
    );
}
