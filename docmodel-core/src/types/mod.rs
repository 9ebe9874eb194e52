//! Type handlers and the registry that dispatches to them.
//!
//! Every [`SchemaType`](crate::schema::SchemaType) is backed by a [`TypeHandler`] that knows
//! how to validate, serialize and deserialize values of that type and how to project the
//! schema node into its storage-validator form. Handlers for structural types (`array`,
//! `object`) recurse back through the [`TypeRegistry`] for their children, so custom types
//! registered at runtime participate in nested schemas like the built-ins do.
//!
//! The registry is an explicit object rather than process-wide state. Build one with
//! [`TypeRegistry::with_builtins`], register additional handlers during startup, then share
//! it read-only (the [`Catalog`](crate::catalog::Catalog) owns one).

mod array;
mod object;
mod scalar;

use bson::{Bson, Document};
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use crate::{
    error::{DocModelError, DocModelResult},
    schema::{PropertyMask, Schema},
};

pub use array::ArrayType;
pub use object::ObjectType;
pub use scalar::{
    AnyType, BooleanType, DateType, IntegerType, LongType, NumberType, ObjectIdType, StringType,
};

/// Validation, conversion and projection behavior for one named type.
///
/// Values are BSON on both sides: the application-level value is whatever the model
/// serializes to, the storage-level value is what gets written to the collection. `None`
/// stands for an absent value.
///
/// # Contract
///
/// - `validate` accepts `None` unconditionally; absence is checked by the enclosing object.
/// - `serialize` validates its input first and falls back to `schema.default` when the
///   input is absent.
/// - `deserialize` is the inverse of `serialize` and also falls back to `schema.default`.
/// - `to_storage_schema` is pure.
pub trait TypeHandler: Send + Sync + Debug {
    /// Checks `value` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Validation`] describing the first violation found.
    fn validate(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<()>;

    /// Converts an application-level value into its storage representation.
    fn serialize(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>>;

    /// Converts a stored value back into its application-level representation.
    fn deserialize(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>>;

    /// Projects `schema` into a `$jsonSchema` node.
    fn to_storage_schema(
        &self,
        registry: &TypeRegistry,
        schema: &Schema,
    ) -> DocModelResult<Document>;
}

/// Mapping from type name to [`TypeHandler`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    handlers: HashMap<String, Arc<dyn TypeHandler>>,
}

impl TypeRegistry {
    /// Creates a registry without any handlers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry with the ten built-in types registered.
    pub fn with_builtins() -> Self {
        let builtins: [(&str, Arc<dyn TypeHandler>); 10] = [
            ("any", Arc::new(AnyType)),
            ("string", Arc::new(StringType)),
            ("boolean", Arc::new(BooleanType)),
            ("number", Arc::new(NumberType)),
            ("integer", Arc::new(IntegerType)),
            ("long", Arc::new(LongType)),
            ("date", Arc::new(DateType)),
            ("array", Arc::new(ArrayType)),
            ("object", Arc::new(ObjectType)),
            ("objectId", Arc::new(ObjectIdType)),
        ];

        let handlers = builtins
            .into_iter()
            .map(|(name, handler)| (name.to_string(), handler))
            .collect();

        Self { handlers }
    }

    /// Registers `handler` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::DuplicateType`] if the name is taken. Existing handlers are
    /// never replaced.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> DocModelResult<()>
    where
        H: TypeHandler + 'static,
    {
        let name = name.into();

        if self.handlers.contains_key(&name) {
            return Err(DocModelError::DuplicateType(name));
        }

        self.handlers.insert(name, Arc::new(handler));
        Ok(())
    }

    /// Looks up the handler registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::UnknownType`] naming the type if nothing is registered.
    pub fn get(&self, name: &str) -> DocModelResult<&dyn TypeHandler> {
        self.handlers
            .get(name)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| DocModelError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn handler_for(&self, schema: &Schema) -> DocModelResult<&dyn TypeHandler> {
        self.get(schema.schema_type.as_str())
    }

    /// Validates `value` against `schema`, preferring the field's own hook.
    pub fn validate(
        &self,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<()> {
        if let Some(hook) = &schema.hooks.validate {
            return hook(value, schema);
        }

        self.handler_for(schema)?.validate(self, value, schema, mask)
    }

    /// Serializes `value` with the field's own hook, or the registered handler.
    pub fn serialize(
        &self,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        if let Some(hook) = &schema.hooks.serialize {
            return hook(value, schema);
        }

        self.handler_for(schema)?.serialize(self, value, schema, mask)
    }

    /// Deserializes `value` with the field's own hook, or the registered handler.
    pub fn deserialize(
        &self,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        if let Some(hook) = &schema.hooks.deserialize {
            return hook(value, schema);
        }

        self.handler_for(schema)?.deserialize(self, value, schema, mask)
    }

    /// Projects `schema` into its `$jsonSchema` form.
    pub fn to_storage_schema(&self, schema: &Schema) -> DocModelResult<Document> {
        self.handler_for(schema)?.to_storage_schema(self, schema)
    }
}

/// `$jsonSchema` keywords carried over from the common descriptive metadata.
///
/// `default`, `examples` and `const` are kept on the internal schema only, the server-side
/// validator rejects them.
pub(crate) fn storage_node(
    bson_type: Option<&str>,
    schema: &Schema,
    keywords: &[&str],
) -> Document {
    let mut node = Document::new();

    if let Some(bson_type) = bson_type {
        node.insert("bsonType", bson_type);
    }
    if let Some(title) = &schema.title {
        node.insert("title", title.as_str());
    }
    if let Some(description) = &schema.description {
        node.insert("description", description.as_str());
    }
    if !schema.enum_values.is_empty() {
        node.insert("enum", Bson::Array(schema.enum_values.clone()));
    }
    for keyword in keywords {
        if let Some(value) = schema.constraints.get(*keyword) {
            node.insert(*keyword, value.clone());
        }
    }

    node
}

/// Name of a BSON value's type, as used in validation messages.
pub(crate) fn describe(value: &Bson) -> String {
    match value {
        Bson::String(s) => format!("\"{}\"", s),
        Bson::Document(_) => "object".to_string(),
        Bson::Array(_) => "array".to_string(),
        other => other.to_string(),
    }
}
