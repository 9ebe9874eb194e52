//! Schema-driven object/document mapping for document databases.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Schemas** ([`schema`]) - The Internal Schema model, property masks and field hooks
//! - **Type handlers** ([`types`]) - Validation, serialization and storage projection per type
//! - **Declarations** ([`field`], [`relation`], [`index`], [`model`]) - Describing classes
//! - **Catalog** ([`catalog`]) - The per-class metadata store and schema assembly
//! - **Storage projection** ([`storage`]) - Validator documents for the server
//! - **Serializer** ([`serializer`]) - Converting between models and stored documents
//! - **Backend abstraction** ([`backend`]) - Traits for implementing storage drivers
//! - **Queries** ([`query`]) - Typed filter construction
//! - **Data sources and collections** ([`datasource`], [`collection`]) - The façade
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! impl Model for User {
//!     fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
//!         catalog.define_field::<Self>("_id", FieldOptions::of("objectId?"))?;
//!         catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
//!         catalog.define_collection::<Self>(CollectionOptions::new().name("users"))
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod datasource;
pub mod error;
pub mod field;
pub mod index;
pub mod model;
pub mod query;
pub mod relation;
pub mod schema;
pub mod serializer;
pub mod storage;
pub mod types;
