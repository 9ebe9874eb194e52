//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and tests, where a running server is not available.
//!
//! # Features
//!
//! - **Native filters** - Evaluates filter documents (`$and`, `$in`, `$regex`, ...) in memory
//! - **Update operators** - `$set`, `$unset`, `$inc` and `$push`, with upserts
//! - **Aggregation** - `$match`, `$lookup`, `$unwind`, `$sort`, `$skip`, `$limit`, `$project`
//! - **Collection metadata** - Validators and indexes are recorded, unique indexes enforced
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{DataSource, DataSourceOptions, catalog::Catalog, memory::InMemoryConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(Catalog::new());
//!     let source = DataSource::new(
//!         InMemoryConnector::new(),
//!         DataSourceOptions::new().database("app"),
//!         catalog,
//!     );
//!
//!     let users = source.collection::<User>().await?;
//!     users.insert_one(&User { name: "Alice".to_string() }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod evaluator;
mod pipeline;
pub mod store;
mod update;

pub use evaluator::FilterEvaluator;
pub use store::{AdminEvent, InMemoryConnector, InMemoryStore, IndexInfo};
