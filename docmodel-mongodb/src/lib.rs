//! MongoDB backend implementation for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait and a
//! `Connector` that builds it from data source options.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Server-side validation** - Collection validators are installed with `create` and `collMod`
//! - **Native queries** - Filters, updates and pipelines are passed to the server unchanged
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//! - **Indexing** - Declared indexes are created through the driver's index model
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{DataSource, DataSourceOptions, catalog::Catalog, mongodb::MongoDbConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = DataSource::new(
//!         MongoDbConnector::new(),
//!         DataSourceOptions::new().url("mongodb://localhost:27017/app"),
//!         Arc::new(Catalog::new()),
//!     );
//!     source.connect().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_mongodb;

pub mod store;

pub use store::{MongoDbConnector, MongoDbStore};
