//! The internal schema model.
//!
//! A [`Schema`] is the canonical, JSON-Schema-like description of a value's shape and
//! type. It is what field declarations normalize into, what classes assemble into, what
//! the storage projector turns into a BSON validator and what the serializer walks when
//! converting values.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::schema::Schema;
//!
//! let schema = Schema::object()
//!     .property("name", Schema::string())
//!     .property("tags", Schema::array(Schema::string()))
//!     .required(["name"]);
//! ```

use bson::{Bson, Document};
use std::{
    any::{TypeId, type_name},
    fmt::{self, Debug, Display},
    sync::Arc,
};

use crate::error::{DocModelError, DocModelResult};

/// The type tag of a schema node.
///
/// The built-in tags map onto the handlers registered by
/// [`TypeRegistry::with_builtins`](crate::types::TypeRegistry::with_builtins). Any other
/// name is carried as [`SchemaType::Custom`] and resolved against the registry at use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Any,
    String,
    Boolean,
    Number,
    Integer,
    Long,
    Date,
    Array,
    Object,
    ObjectId,
    /// A type registered at runtime under this name.
    Custom(String),
}

impl SchemaType {
    /// Returns the registry name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            SchemaType::Any => "any",
            SchemaType::String => "string",
            SchemaType::Boolean => "boolean",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Long => "long",
            SchemaType::Date => "date",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
            SchemaType::ObjectId => "objectId",
            SchemaType::Custom(name) => name,
        }
    }
}

impl From<&str> for SchemaType {
    fn from(name: &str) -> Self {
        match name {
            "any" => SchemaType::Any,
            "string" => SchemaType::String,
            "boolean" => SchemaType::Boolean,
            "number" => SchemaType::Number,
            "integer" => SchemaType::Integer,
            "long" => SchemaType::Long,
            "date" => SchemaType::Date,
            "array" => SchemaType::Array,
            "object" => SchemaType::Object,
            "objectId" => SchemaType::ObjectId,
            other => SchemaType::Custom(other.to_string()),
        }
    }
}

impl Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item specification of an array schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    /// Every element is described by the same schema.
    Uniform(Box<Schema>),
    /// Element `i` is described by schema `i`; the array may not be longer than the tuple.
    Tuple(Vec<Schema>),
}

/// Declared properties of an object schema, kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, Schema)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a property. A replaced property keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, schema: Schema) {
        let name = name.into();

        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = schema,
            None => self.entries.push((name, schema)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, schema)| schema)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.entries
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Schema)> for Properties {
    fn from_iter<I: IntoIterator<Item = (N, Schema)>>(iter: I) -> Self {
        let mut properties = Properties::new();
        for (name, schema) in iter {
            properties.insert(name, schema);
        }
        properties
    }
}

/// Identity of the Rust type an object schema was assembled from.
///
/// Deserialization uses it to check that a document is being turned into the type the
/// schema describes.
#[derive(Clone, Copy)]
pub struct ClassRef {
    name: &'static str,
    type_id: TypeId,
}

impl ClassRef {
    pub fn of<T: 'static>() -> Self {
        let full = type_name::<T>();
        let name = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);

        Self { name, type_id: TypeId::of::<T>() }
    }

    /// Short name of the type, without module path or generics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.name)
    }
}

pub type ValidateHook = Arc<dyn Fn(Option<&Bson>, &Schema) -> DocModelResult<()> + Send + Sync>;
pub type SerializeHook =
    Arc<dyn Fn(Option<&Bson>, &Schema) -> DocModelResult<Option<Bson>> + Send + Sync>;
pub type DeserializeHook =
    Arc<dyn Fn(Option<&Bson>, &Schema) -> DocModelResult<Option<Bson>> + Send + Sync>;

/// Per-field overrides that take precedence over the registered type handler.
#[derive(Clone, Default)]
pub struct FieldHooks {
    pub validate: Option<ValidateHook>,
    pub serialize: Option<SerializeHook>,
    pub deserialize: Option<DeserializeHook>,
}

impl FieldHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Bson>, &Schema) -> DocModelResult<()> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(hook));
        self
    }

    pub fn serialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Bson>, &Schema) -> DocModelResult<Option<Bson>> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(hook));
        self
    }

    pub fn deserialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Bson>, &Schema) -> DocModelResult<Option<Bson>> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.validate.is_none() && self.serialize.is_none() && self.deserialize.is_none()
    }
}

impl Debug for FieldHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHooks")
            .field("validate", &self.validate.is_some())
            .field("serialize", &self.serialize.is_some())
            .field("deserialize", &self.deserialize.is_some())
            .finish()
    }
}

impl PartialEq for FieldHooks {
    fn eq(&self, other: &Self) -> bool {
        fn same<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }

        same(&self.validate, &other.validate)
            && same(&self.serialize, &other.serialize)
            && same(&self.deserialize, &other.deserialize)
    }
}

/// A node of the internal schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub schema_type: SchemaType,
    /// Declared properties (object schemas only).
    pub properties: Option<Properties>,
    /// Names of properties that must be present (object schemas only).
    pub required: Vec<String>,
    /// Item specification (array schemas only).
    pub items: Option<Items>,
    /// Value used when the input is absent.
    pub default: Option<Bson>,
    /// Whether undeclared properties are preserved (object schemas only).
    pub additional_properties: Option<bool>,
    /// The Rust type this object schema was assembled from.
    pub class: Option<ClassRef>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub examples: Vec<Bson>,
    pub enum_values: Vec<Bson>,
    pub const_value: Option<Bson>,
    /// Pass-through validation keywords (`minimum`, `maxLength`, `minItems`, ...).
    pub constraints: Document,
    pub hooks: FieldHooks,
}

impl Schema {
    pub fn new(schema_type: impl Into<SchemaType>) -> Self {
        Self {
            schema_type: schema_type.into(),
            properties: None,
            required: Vec::new(),
            items: None,
            default: None,
            additional_properties: None,
            class: None,
            title: None,
            description: None,
            examples: Vec::new(),
            enum_values: Vec::new(),
            const_value: None,
            constraints: Document::new(),
            hooks: FieldHooks::default(),
        }
    }

    pub fn any() -> Self {
        Self::new(SchemaType::Any)
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::new(SchemaType::Integer)
    }

    pub fn long() -> Self {
        Self::new(SchemaType::Long)
    }

    pub fn date() -> Self {
        Self::new(SchemaType::Date)
    }

    pub fn object_id() -> Self {
        Self::new(SchemaType::ObjectId)
    }

    /// An object schema with no declared properties.
    pub fn object() -> Self {
        Self::new(SchemaType::Object)
    }

    /// An array schema whose elements all follow `items`.
    pub fn array(items: Schema) -> Self {
        let mut schema = Self::new(SchemaType::Array);
        schema.items = Some(Items::Uniform(Box::new(items)));
        schema
    }

    /// An array schema validated position by position.
    pub fn tuple(items: impl IntoIterator<Item = Schema>) -> Self {
        let mut schema = Self::new(SchemaType::Array);
        schema.items = Some(Items::Tuple(items.into_iter().collect()));
        schema
    }

    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(name, schema);
        self
    }

    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.required.contains(&name) {
                self.required.push(name);
            }
        }
        self
    }

    pub fn with_default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn additional_properties(mut self, allow: bool) -> Self {
        self.additional_properties = Some(allow);
        self
    }

    pub fn class(mut self, class: ClassRef) -> Self {
        self.class = Some(class);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn example(mut self, example: impl Into<Bson>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn enumeration<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn constant(mut self, value: impl Into<Bson>) -> Self {
        self.const_value = Some(value.into());
        self
    }

    /// Adds a pass-through validation keyword such as `minimum` or `maxLength`.
    pub fn constraint(mut self, keyword: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.constraints.insert(keyword.into(), value.into());
        self
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Whether undeclared properties survive serialization.
    pub fn allows_additional_properties(&self) -> bool {
        self.additional_properties.unwrap_or(false)
    }

    /// Checks the structural invariants of this schema and all nested schemas.
    ///
    /// Every required name of an object schema must be a declared property.
    pub fn check(&self) -> DocModelResult<()> {
        if !self.required.is_empty() {
            for name in &self.required {
                let declared = self
                    .properties
                    .as_ref()
                    .is_some_and(|properties| properties.contains(name));

                if !declared {
                    return Err(DocModelError::Declaration(format!(
                        "required property {} is not declared in properties",
                        name
                    )));
                }
            }
        }

        if let Some(properties) = &self.properties {
            for (_, schema) in properties.iter() {
                schema.check()?;
            }
        }

        match &self.items {
            Some(Items::Uniform(schema)) => schema.check()?,
            Some(Items::Tuple(schemas)) => {
                for schema in schemas {
                    schema.check()?;
                }
            }
            None => {}
        }

        Ok(())
    }
}

/// Property allow/deny lists applied by the object handler.
///
/// Masks are evaluated by property *name*: with `include` set only the listed properties
/// are processed, with `exclude` set the listed properties are skipped. They apply to the
/// object the operation is invoked on and are not carried into nested objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMask {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl PropertyMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the property `name` takes part in the operation.
    pub fn allows(&self, name: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.iter().any(|item| item == name) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|item| item == name) {
                return false;
            }
        }

        true
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}
