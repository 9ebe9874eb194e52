//! Convenient re-exports of commonly used types from docmodel.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```
//!
//! This provides access to:
//! - The `Model` trait, its derive macro and the declaration options
//! - Data sources, connectors and model collections
//! - Query construction and filtering
//! - Schemas, the type registry and the serializer
//! - Error types

pub use docmodel_macros::Model;
pub use docmodel_core::{
    backend::{Connector, Namespace, QueryOptions, StoreBackend},
    catalog::Catalog,
    collection::{FindOptions, ModelCollection, UpdateOptions},
    config::DataSourceOptions,
    datasource::DataSource,
    error::{DocModelError, DocModelResult},
    field::{FieldOptions, SimpleType},
    index::IndexDeclaration,
    model::{
        ClassOptions, CollectionOptions, Model, ModelExt, SyncStrategy, ValidationAction,
        ValidationLevel, ValidationPolicy,
    },
    query::{
        Expr, FieldOp, Filter, IntoFilter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection,
    },
    relation::{RelationKind, RelationOptions},
    schema::{FieldHooks, PropertyMask, Schema, SchemaType},
    serializer::{DeserializeOptions, Serializer},
    types::{TypeHandler, TypeRegistry},
};
pub use bson::{Bson, DateTime, Document, doc, oid::ObjectId};
pub use serde::{Deserialize, Serialize};
