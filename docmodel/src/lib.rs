//! Main docmodel crate: schema-driven object/document mapping for document databases.
//!
//! This crate is the primary entry point for users of the docmodel framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! access to the storage backends.
//!
//! # Features
//!
//! - **Declared schemas** - Describe classes field by field, or supply a custom schema
//! - **Typed serialization** - Validate and convert values on their way to and from the store
//! - **Server-side validation** - Collection validators derived from the class schema
//! - **Relations** - Resolve related documents by `$lookup` or by a follow-up query
//! - **Multiple backends** - In-memory and MongoDB storage behind one backend trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryConnector};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "users", validate)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     #[index(unique)]
//!     pub email: String,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocModelResult<()> {
//!     let mut catalog = Catalog::new();
//!     catalog.declare::<User>()?;
//!
//!     let source = DataSource::new(
//!         InMemoryConnector::new(),
//!         DataSourceOptions::new().database("app"),
//!         Arc::new(catalog),
//!     );
//!
//!     // Registers the collection (validator and indexes) on first use
//!     let users = source.collection::<User>().await?;
//!
//!     users
//!         .insert_one(&User { id: None, email: "alice@example.com".into(), name: "Alice".into() })
//!         .await?;
//!
//!     let query = Query::builder().filter(Filter::eq("name", "Alice")).build();
//!     let found = users.find(query, FindOptions::default()).await?;
//!     println!("Found users: {:?}", found);
//!
//!     source.close().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docmodel;

pub mod prelude;

pub use docmodel_core::{
    backend, catalog, collection, config, datasource, error, field, index, model, query, relation,
    schema, serializer, storage, types,
};
pub use docmodel_core::{config::DataSourceOptions, datasource::DataSource};
pub use docmodel_macros::Model;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{
        AdminEvent, FilterEvaluator, InMemoryConnector, InMemoryStore, IndexInfo,
    };
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbConnector, MongoDbStore};
}
