//! Model traits and the class-level metadata attached to them.
//!
//! A model is a plain serde type that describes itself to a [`Catalog`] once. The
//! description is a sequence of declaration calls (fields, relations, indexes, schema and
//! collection options), written by hand or generated with `#[derive(Model)]`.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::fmt::{self, Display};

use crate::{
    backend::Namespace,
    catalog::Catalog,
    error::{DocModelError, DocModelResult},
    schema::{ClassRef, Schema},
};

/// Core trait for types mapped to documents.
///
/// # Example
///
/// ```ignore
/// use docmodel::prelude::*;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub name: String,
///     pub email: Option<String>,
/// }
///
/// impl Model for User {
///     fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
///         catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
///         catalog.define_field::<Self>("email", FieldOptions::of("string?"))?;
///         catalog.define_collection::<Self>(CollectionOptions::new().name("users"))
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Declares this model's fields, relations, indexes and collection binding.
    ///
    /// Called at most once per catalog, through [`Catalog::declare`].
    fn declare(catalog: &mut Catalog) -> DocModelResult<()>;
}

/// Conversion helpers available on every [`Model`].
pub trait ModelExt: Model {
    /// Converts this model to its application-level BSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_bson(&self) -> DocModelResult<Bson>;

    /// Converts this model to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model is not a struct-like value.
    fn to_document(&self) -> DocModelResult<Document>;

    /// Creates a model from a BSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_bson(bson: Bson) -> DocModelResult<Self>;

    fn to_json(&self) -> DocModelResult<Value>;

    fn from_json(value: Value) -> DocModelResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_bson(&self) -> DocModelResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn to_document(&self) -> DocModelResult<Document> {
        match self.to_bson()? {
            Bson::Document(document) => Ok(document),
            other => Err(DocModelError::Serialization(format!(
                "expected a document, got {}",
                other
            ))),
        }
    }

    fn from_bson(bson: Bson) -> DocModelResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn to_json(&self) -> DocModelResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocModelResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Options for assembling a class schema from its declared fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassOptions {
    /// Logical name of the class. Defaults to the type name.
    pub name: Option<String>,
    /// Use inherited property schemas as fallback bases, and include properties that are
    /// only known to the inherited source.
    #[serde(default)]
    pub use_property_schemas: bool,
    /// Keep undeclared properties when serializing.
    #[serde(default)]
    pub additional_properties: bool,
    pub description: Option<String>,
}

impl ClassOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn use_property_schemas(mut self, enabled: bool) -> Self {
        self.use_property_schemas = enabled;
        self
    }

    pub fn additional_properties(mut self, allow: bool) -> Self {
        self.additional_properties = allow;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How strictly the server applies the collection validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Off,
    #[default]
    Strict,
    Moderate,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

/// What the server does with a document that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationAction {
    #[default]
    Error,
    Warn,
}

impl ValidationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationAction::Error => "error",
            ValidationAction::Warn => "warn",
        }
    }
}

/// Whether registration touches the validator of a collection that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Leave the existing validator untouched.
    Never,
    /// Set the validator only when none is set.
    #[default]
    IfNotExists,
    /// Always overwrite the validator.
    Override,
}

/// Server-side document validation for a bound collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    #[serde(default)]
    pub level: ValidationLevel,
    #[serde(default)]
    pub action: ValidationAction,
    #[serde(default)]
    pub sync: SyncStrategy,
}

impl ValidationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: ValidationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn action(mut self, action: ValidationAction) -> Self {
        self.action = action;
        self
    }

    pub fn sync(mut self, sync: SyncStrategy) -> Self {
        self.sync = sync;
        self
    }
}

/// Options for binding a class to a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Collection name. Defaults to the class's logical name.
    pub name: Option<String>,
    /// Database owning the collection. Defaults to the data source's database.
    pub database: Option<String>,
    /// Install a validator built from the class schema.
    pub validation: Option<ValidationPolicy>,
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn validation(mut self, policy: ValidationPolicy) -> Self {
        self.validation = Some(policy);
        self
    }
}

/// Collection binding of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionBinding {
    pub name: String,
    pub database: Option<String>,
    pub validation: Option<ValidationPolicy>,
}

impl CollectionBinding {
    /// The namespace of the bound collection, falling back to `default_database`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Configuration`] if neither names a database.
    pub fn namespace(
        &self,
        class: &str,
        default_database: Option<&str>,
    ) -> DocModelResult<Namespace> {
        let database = self
            .database
            .as_deref()
            .or(default_database)
            .ok_or_else(|| {
                DocModelError::Configuration(format!("No valid database for {}", class))
            })?;

        Ok(Namespace::new(database, self.name.as_str()))
    }
}

/// How a class's schema was declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaSource {
    #[default]
    Undeclared,
    /// Assembled from field declarations.
    FieldBased,
    /// Supplied whole by [`Catalog::define_custom_schema`].
    CustomSchema,
}

impl Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaSource::Undeclared => "undeclared",
            SchemaSource::FieldBased => "field-based",
            SchemaSource::CustomSchema => "custom",
        };
        f.write_str(name)
    }
}

/// The assembled metadata of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSchema {
    pub class: ClassRef,
    /// Logical name of the class.
    pub name: String,
    pub source: SchemaSource,
    /// The class's Internal Schema (`type: object`).
    pub schema: Schema,
    pub collection: Option<CollectionBinding>,
}

impl ClassSchema {
    /// Returns the collection binding.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::NotACollection`] for classes that are not bound.
    pub fn binding(&self) -> DocModelResult<&CollectionBinding> {
        self.collection
            .as_ref()
            .ok_or_else(|| DocModelError::NotACollection(self.class.name().to_string()))
    }

    /// The namespace of the bound collection.
    pub fn namespace(&self, default_database: Option<&str>) -> DocModelResult<Namespace> {
        self.binding()?.namespace(&self.name, default_database)
    }
}
