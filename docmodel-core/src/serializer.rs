//! Serialization between models and stored documents.
//!
//! [`Serializer::serialize`] always re-validates the storage value it produced, so nothing
//! invalid is ever handed to a backend. [`Serializer::deserialize`] picks the schema to apply
//! per call: an explicit schema, then a simple-type override, then the class's own schema.

use bson::{Bson, Document, de::deserialize_from_bson};
use serde::de::DeserializeOwned;
use std::any::TypeId;

use crate::{
    catalog::Catalog,
    error::{DocModelError, DocModelResult},
    field::SimpleType,
    model::{Model, ModelExt},
    schema::{PropertyMask, Schema},
};

/// Per-call deserialization options.
#[derive(Debug, Clone, PartialEq)]
pub struct DeserializeOptions {
    /// Schema to apply instead of the class schema.
    pub schema: Option<Schema>,
    /// Simple-type shorthand to apply instead of the class schema.
    pub simple_type: Option<SimpleType>,
    /// With `false`, stored documents are returned as they are.
    pub deserialize: bool,
    pub mask: PropertyMask,
}

impl Default for DeserializeOptions {
    fn default() -> Self {
        Self {
            schema: None,
            simple_type: None,
            deserialize: true,
            mask: PropertyMask::default(),
        }
    }
}

impl DeserializeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn simple_type(mut self, simple_type: impl Into<SimpleType>) -> Self {
        self.simple_type = Some(simple_type.into());
        self
    }

    /// Disables transformation of stored documents.
    pub fn raw(mut self) -> Self {
        self.deserialize = false;
        self
    }

    pub fn mask(mut self, mask: PropertyMask) -> Self {
        self.mask = mask;
        self
    }
}

/// Converts values through the catalog's schemas and type registry.
#[derive(Debug, Clone, Copy)]
pub struct Serializer<'a> {
    catalog: &'a Catalog,
}

impl<'a> Serializer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Validates `value` against `schema`.
    pub fn validate(
        &self,
        schema: &Schema,
        value: Option<&Bson>,
        mask: &PropertyMask,
    ) -> DocModelResult<()> {
        self.catalog.registry().validate(value, schema, mask)
    }

    /// Converts `value` into its storage form and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Validation`] if the input or the produced storage value does
    /// not satisfy `schema`.
    pub fn serialize(
        &self,
        schema: &Schema,
        value: Option<&Bson>,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        let registry = self.catalog.registry();
        let candidate = registry.serialize(value, schema, mask)?;

        registry.validate(candidate.as_ref(), schema, mask)?;
        Ok(candidate)
    }

    /// Serializes a model into the document stored for it.
    ///
    /// # Errors
    ///
    /// Fails if `T` has not been declared or does not satisfy its schema.
    pub fn serialize_model<T: Model>(
        &self,
        model: &T,
        mask: &PropertyMask,
    ) -> DocModelResult<Document> {
        let schema = self.class_schema::<T>()?;
        let value = model.to_bson()?;

        match self.serialize(schema, Some(&value), mask)? {
            Some(Bson::Document(document)) => Ok(document),
            Some(other) => Err(DocModelError::Serialization(format!(
                "expected a document, got {}",
                other
            ))),
            None => Err(DocModelError::Serialization("model serialized to nothing".to_string())),
        }
    }

    /// Resolves the schema a read applies, or `None` when transformation is disabled.
    pub fn resolve_schema<'s>(
        &self,
        options: &'s DeserializeOptions,
        default: Option<&'s Schema>,
    ) -> DocModelResult<Option<std::borrow::Cow<'s, Schema>>> {
        use std::borrow::Cow;

        if !options.deserialize {
            return Ok(None);
        }
        if let Some(schema) = &options.schema {
            return Ok(Some(Cow::Borrowed(schema)));
        }
        if let Some(simple_type) = &options.simple_type {
            return simple_type
                .to_declared_schema(self.catalog)
                .map(|schema| Some(Cow::Owned(schema)));
        }

        Ok(default.map(Cow::Borrowed))
    }

    /// Converts a stored document back into its application-level form.
    ///
    /// The source document is not modified.
    pub fn deserialize(
        &self,
        document: &Document,
        options: &DeserializeOptions,
        default: Option<&Schema>,
    ) -> DocModelResult<Bson> {
        let value = Bson::Document(document.clone());

        match self.resolve_schema(options, default)? {
            None => Ok(value),
            Some(schema) => Ok(self
                .catalog
                .registry()
                .deserialize(Some(&value), &schema, &options.mask)?
                .unwrap_or(Bson::Null)),
        }
    }

    /// Deserializes a stored document into `R`.
    ///
    /// When the applied schema was assembled from a class, `R` must be that class.
    pub fn deserialize_into<R: DeserializeOwned + 'static>(
        &self,
        document: &Document,
        options: &DeserializeOptions,
        default: Option<&Schema>,
    ) -> DocModelResult<R> {
        self.check_target::<R>(options, default)?;

        let value = self.deserialize(document, options, default)?;
        Ok(deserialize_from_bson(value)?)
    }

    /// Fails when the schema a read applies belongs to a class other than `R`.
    pub fn check_target<R: 'static>(
        &self,
        options: &DeserializeOptions,
        default: Option<&Schema>,
    ) -> DocModelResult<()> {
        let Some(schema) = self.resolve_schema(options, default)? else {
            return Ok(());
        };

        match &schema.class {
            Some(class) if class.type_id() != TypeId::of::<R>() => {
                Err(DocModelError::Serialization(format!(
                    "schema of {} cannot be deserialized into {}",
                    class.name(),
                    std::any::type_name::<R>()
                )))
            }
            _ => Ok(()),
        }
    }

    fn class_schema<T: 'static>(&self) -> DocModelResult<&'a Schema> {
        self.catalog.schema_of::<T>().ok_or_else(|| {
            DocModelError::Declaration(format!(
                "model {} is not declared",
                crate::schema::ClassRef::of::<T>().name()
            ))
        })
    }
}
