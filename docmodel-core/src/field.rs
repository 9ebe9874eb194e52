//! Field declarations and the field schema builder.
//!
//! A field is declared with [`FieldOptions`]: an explicit [`Schema`], a [`SimpleType`]
//! shorthand, or neither. The builder turns it into the schema node and required flag the
//! class schema is assembled from:
//!
//! 1. An explicit schema wins outright.
//! 2. A simple type is normalized (`"string"`, `"objectId[]"`, `"integer?"`, a model).
//! 3. Otherwise the class's inherited property schema, if any, is used.
//! 4. Otherwise the field is a required `string`.
//!
//! A declared default value and any per-field hooks are attached on top.

use bson::Bson;
use std::fmt::{self, Debug};

use crate::{
    catalog::Catalog,
    error::{DocModelError, DocModelResult},
    model::Model,
    schema::{ClassRef, FieldHooks, Schema, SchemaType},
};

/// A reference to another model, used by field shorthands and relations.
#[derive(Clone, Copy)]
pub struct ModelRef {
    class: ClassRef,
    declare: fn(&mut Catalog) -> DocModelResult<()>,
}

impl ModelRef {
    pub fn of<T: Model>() -> Self {
        Self {
            class: ClassRef::of::<T>(),
            declare: |catalog| catalog.declare::<T>(),
        }
    }

    pub fn class(&self) -> ClassRef {
        self.class
    }

    /// Declares the referenced model and returns its class schema.
    ///
    /// A model that is still being declared (a self or mutually recursive reference)
    /// resolves to an open object schema carrying only the class identity, so nested
    /// values pass through whole instead of being cut to the fields declared so far.
    pub(crate) fn resolve(&self, catalog: &mut Catalog) -> DocModelResult<Schema> {
        (self.declare)(catalog)?;

        let open = || Schema::object().class(self.class).additional_properties(true);
        if catalog.is_declaring(self.class.type_id()) {
            return Ok(open());
        }

        Ok(catalog
            .schema_by_id(self.class.type_id())
            .cloned()
            .unwrap_or_else(open))
    }
}

impl Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelRef({})", self.class.name())
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
    }
}

/// Shorthand for a field's type.
///
/// Names follow the registry (`"string"`, `"objectId"`, custom names) and may carry the
/// suffixes `[]` for an array and `?` for an optional field: `"string[]?"` is an optional
/// array of strings.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleType {
    Name(String),
    Model(ModelRef),
    Array(Box<SimpleType>),
    Optional(Box<SimpleType>),
}

impl SimpleType {
    pub fn model<T: Model>() -> Self {
        SimpleType::Model(ModelRef::of::<T>())
    }

    pub fn array(self) -> Self {
        SimpleType::Array(Box::new(self))
    }

    pub fn optional(self) -> Self {
        SimpleType::Optional(Box::new(self))
    }

    /// Parses a type name with optional `[]` and `?` suffixes.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();

        if let Some(inner) = name.strip_suffix('?') {
            return SimpleType::parse(inner).optional();
        }
        if let Some(inner) = name.strip_suffix("[]") {
            return SimpleType::parse(inner).array();
        }

        SimpleType::Name(name.to_string())
    }

    /// Whether the outermost marker makes the field optional.
    pub fn is_optional(&self) -> bool {
        matches!(self, SimpleType::Optional(_))
    }

    /// Normalizes the shorthand into a schema node.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::UnknownType`] for names the registry does not know.
    pub fn to_schema(&self, catalog: &mut Catalog) -> DocModelResult<Schema> {
        match self {
            SimpleType::Name(name) => {
                if !catalog.registry().contains(name) {
                    return Err(DocModelError::UnknownType(name.clone()));
                }
                Ok(Schema::new(SchemaType::from(name.as_str())))
            }
            SimpleType::Model(model) => model.resolve(catalog),
            SimpleType::Array(inner) => Ok(Schema::array(inner.to_schema(catalog)?)),
            SimpleType::Optional(inner) => inner.to_schema(catalog),
        }
    }

    /// Normalizes the shorthand against a catalog whose models are already declared.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::UnknownType`] for unknown names and
    /// [`DocModelError::Declaration`] for models missing from the catalog.
    pub fn to_declared_schema(&self, catalog: &Catalog) -> DocModelResult<Schema> {
        match self {
            SimpleType::Name(name) => {
                catalog.registry().get(name)?;
                Ok(Schema::new(SchemaType::from(name.as_str())))
            }
            SimpleType::Model(model) => catalog
                .schema_by_id(model.class.type_id())
                .cloned()
                .ok_or_else(|| {
                    let name = model.class.name();
                    DocModelError::Declaration(format!("model {} is not declared", name))
                }),
            SimpleType::Array(inner) => Ok(Schema::array(inner.to_declared_schema(catalog)?)),
            SimpleType::Optional(inner) => inner.to_declared_schema(catalog),
        }
    }
}

impl From<&str> for SimpleType {
    fn from(name: &str) -> Self {
        SimpleType::parse(name)
    }
}

impl From<String> for SimpleType {
    fn from(name: String) -> Self {
        SimpleType::parse(&name)
    }
}

/// Options of a single field declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOptions {
    pub schema: Option<Schema>,
    pub simple_type: Option<SimpleType>,
    pub required: Option<bool>,
    pub default: Option<Bson>,
    pub hooks: FieldHooks,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field with the given simple type.
    pub fn of(simple_type: impl Into<SimpleType>) -> Self {
        Self::new().simple_type(simple_type)
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn simple_type(mut self, simple_type: impl Into<SimpleType>) -> Self {
        self.simple_type = Some(simple_type.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// Inherited property metadata from a general schema source.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDeclaration {
    pub schema: Schema,
    pub required: bool,
}

/// A field declaration with its type shorthand already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    typed: Option<Schema>,
    required: Option<bool>,
    default: Option<Bson>,
    hooks: FieldHooks,
}

impl FieldDeclaration {
    /// Resolves the type part of `options`. Model references are declared on the way.
    pub(crate) fn resolve(catalog: &mut Catalog, options: FieldOptions) -> DocModelResult<Self> {
        let (typed, implied_required) = match (options.schema, &options.simple_type) {
            (Some(schema), _) => (Some(schema), None),
            (None, Some(simple_type)) => (
                Some(simple_type.to_schema(catalog)?),
                simple_type.is_optional().then_some(false),
            ),
            (None, None) => (None, None),
        };

        Ok(Self {
            typed,
            required: options.required.or(implied_required),
            default: options.default,
            hooks: options.hooks,
        })
    }

    /// Builds the field's schema node and required flag on top of an optional base.
    pub fn build(&self, base: Option<&PropertyDeclaration>) -> (Schema, bool) {
        let (mut schema, base_required) = match (&self.typed, base) {
            (Some(schema), _) => (schema.clone(), None),
            (None, Some(base)) => (base.schema.clone(), Some(base.required)),
            (None, None) => (Schema::string(), None),
        };

        if let Some(default) = &self.default {
            schema.default = Some(default.clone());
        }
        if !self.hooks.is_empty() {
            schema.hooks = self.hooks.clone();
        }

        let required = self.required.or(base_required).unwrap_or(true);
        (schema, required)
    }
}
