//! The catalog: per-class metadata keyed by type identity.
//!
//! Declarations are written during a setup phase through `&mut Catalog`. Afterwards the
//! catalog is frozen behind an `Arc` and shared read-only with data sources and collections,
//! so lookups need no synchronization.
//!
//! The catalog owns the [`TypeRegistry`]; custom types are registered on it before the
//! models that use them are declared.
//!
//! # Example
//!
//! ```ignore
//! let mut catalog = Catalog::new();
//! catalog.register_type("money", MoneyType)?;
//! catalog.declare::<User>()?;
//! catalog.declare::<Post>()?;
//!
//! let catalog = Arc::new(catalog);
//! ```

use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
};
use tracing::debug;

use crate::{
    error::{DocModelError, DocModelResult},
    field::{FieldDeclaration, FieldOptions, PropertyDeclaration},
    index::IndexDeclaration,
    model::{ClassOptions, ClassSchema, CollectionBinding, CollectionOptions, Model, SchemaSource},
    relation::{RelationDeclaration, RelationOptions},
    schema::{ClassRef, Schema},
    types::{TypeHandler, TypeRegistry},
};

#[derive(Debug)]
struct ClassEntry {
    class: ClassRef,
    source: SchemaSource,
    options: ClassOptions,
    custom_schema: Option<Schema>,
    fields: Vec<(String, FieldDeclaration)>,
    properties: Vec<(String, PropertyDeclaration)>,
    relations: Vec<(String, RelationDeclaration)>,
    indexes: Vec<IndexDeclaration>,
    collection: Option<CollectionOptions>,
    assembled: Option<ClassSchema>,
}

impl ClassEntry {
    fn new(class: ClassRef) -> Self {
        Self {
            class,
            source: SchemaSource::Undeclared,
            options: ClassOptions::default(),
            custom_schema: None,
            fields: Vec::new(),
            properties: Vec::new(),
            relations: Vec::new(),
            indexes: Vec::new(),
            collection: None,
            assembled: None,
        }
    }

    /// Moves the class to `source`, failing on a conflicting declaration style.
    fn set_source(&mut self, source: SchemaSource) -> DocModelResult<()> {
        match self.source {
            SchemaSource::Undeclared => {
                self.source = source;
                Ok(())
            }
            current if current == source => Ok(()),
            current => Err(DocModelError::SchemaConflict(format!(
                "class {} is declared with a {} schema and cannot also use a {} schema",
                self.class.name(),
                current,
                source
            ))),
        }
    }

    fn property(&self, name: &str) -> Option<&PropertyDeclaration> {
        if !self.options.use_property_schemas {
            return None;
        }
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, property)| property)
    }

    /// Builds the class's internal schema from its declarations.
    fn schema(&self) -> Schema {
        if let Some(custom) = &self.custom_schema {
            let mut schema = custom.clone();
            schema.class.get_or_insert(self.class);
            return schema;
        }

        let mut schema = Schema::object().class(self.class);

        if self.options.use_property_schemas {
            for (name, property) in &self.properties {
                if self.fields.iter().any(|(field, _)| field == name) {
                    continue;
                }
                schema = schema.property(name.as_str(), property.schema.clone());
                if property.required {
                    schema = schema.required([name.as_str()]);
                }
            }
        }

        for (name, field) in &self.fields {
            let (field_schema, required) = field.build(self.property(name));
            schema = schema.property(name.as_str(), field_schema);
            if required {
                schema = schema.required([name.as_str()]);
            }
        }

        if self.options.additional_properties {
            schema.additional_properties = Some(true);
        }
        if let Some(description) = &self.options.description {
            schema.description = Some(description.clone());
        }

        schema
    }

    /// Reassembles the class schema if the class has a declared style.
    fn refresh(&mut self) -> DocModelResult<()> {
        if self.source == SchemaSource::Undeclared {
            return Ok(());
        }

        let schema = self.schema();
        schema.check()?;

        let name = self
            .options
            .name
            .clone()
            .unwrap_or_else(|| self.class.name().to_string());

        let collection = self.collection.as_ref().map(|options| CollectionBinding {
            name: options.name.clone().unwrap_or_else(|| name.clone()),
            database: options.database.clone(),
            validation: options.validation,
        });

        self.assembled = Some(ClassSchema {
            class: self.class,
            name,
            source: self.source,
            schema,
            collection,
        });

        Ok(())
    }
}

/// Per-class metadata store.
#[derive(Debug)]
pub struct Catalog {
    registry: TypeRegistry,
    classes: HashMap<TypeId, ClassEntry>,
    declared: HashSet<TypeId>,
    /// Classes whose `declare` is running.
    declaring: HashSet<TypeId>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Creates a catalog with the built-in types registered.
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::with_builtins())
    }

    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry,
            classes: HashMap::new(),
            declared: HashSet::new(),
            declaring: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Registers a custom type handler.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::DuplicateType`] if the name is already registered.
    pub fn register_type<H>(&mut self, name: impl Into<String>, handler: H) -> DocModelResult<()>
    where
        H: TypeHandler + 'static,
    {
        self.registry.register(name, handler)
    }

    /// Runs `T::declare` unless it already ran on this catalog.
    ///
    /// A failed declaration may be retried.
    pub fn declare<T: Model>(&mut self) -> DocModelResult<()> {
        let type_id = TypeId::of::<T>();

        if !self.declared.insert(type_id) {
            return Ok(());
        }

        self.declaring.insert(type_id);
        let result = T::declare(self);
        self.declaring.remove(&type_id);

        if result.is_err() {
            self.declared.remove(&type_id);
        } else {
            debug!(class = ClassRef::of::<T>().name(), "declared model");
        }

        result
    }

    /// Whether the class's `declare` has started but not finished.
    pub(crate) fn is_declaring(&self, type_id: TypeId) -> bool {
        self.declaring.contains(&type_id)
    }

    fn entry<T: 'static>(&mut self) -> &mut ClassEntry {
        self.classes
            .entry(TypeId::of::<T>())
            .or_insert_with(|| ClassEntry::new(ClassRef::of::<T>()))
    }

    fn entry_mut<T: 'static>(
        &mut self,
        f: impl FnOnce(&mut ClassEntry) -> DocModelResult<()>,
    ) -> DocModelResult<()> {
        let entry = self.entry::<T>();
        f(entry)?;
        entry.refresh()
    }

    /// Declares a field of `T`.
    ///
    /// Redeclaring a field replaces the earlier declaration in place.
    ///
    /// # Errors
    ///
    /// Fails if the field's type cannot be resolved, or if `T` uses a custom schema.
    pub fn define_field<T: 'static>(
        &mut self,
        property: impl Into<String>,
        options: FieldOptions,
    ) -> DocModelResult<()> {
        let property = property.into();
        let field = FieldDeclaration::resolve(self, options)?;

        self.entry_mut::<T>(|entry| {
            entry.set_source(SchemaSource::FieldBased)?;
            match entry.fields.iter_mut().find(|(name, _)| *name == property) {
                Some((_, existing)) => *existing = field,
                None => entry.fields.push((property, field)),
            }
            Ok(())
        })
    }

    /// Records inherited property metadata for `T` from a general schema source.
    ///
    /// Only used when the class opts in with [`ClassOptions::use_property_schemas`].
    pub fn define_property<T: 'static>(
        &mut self,
        property: impl Into<String>,
        schema: Schema,
        required: bool,
    ) -> DocModelResult<()> {
        let property = property.into();

        self.entry_mut::<T>(|entry| {
            let declaration = PropertyDeclaration { schema, required };
            match entry.properties.iter_mut().find(|(name, _)| *name == property) {
                Some((_, existing)) => *existing = declaration,
                None => entry.properties.push((property, declaration)),
            }
            Ok(())
        })
    }

    /// Declares a relation on a property of `T`, together with the property's field.
    pub fn define_relation<T: 'static>(
        &mut self,
        property: impl Into<String>,
        options: RelationOptions,
    ) -> DocModelResult<()> {
        let property = property.into();

        self.define_field::<T>(
            property.as_str(),
            FieldOptions::of(options.field_type()).required(false),
        )?;

        let relation = options.into_declaration();
        self.entry_mut::<T>(|entry| {
            match entry.relations.iter_mut().find(|(name, _)| *name == property) {
                Some((_, existing)) => *existing = relation,
                None => entry.relations.push((property, relation)),
            }
            Ok(())
        })
    }

    /// Declares an index on `T`'s collection.
    pub fn define_index<T: 'static>(&mut self, index: IndexDeclaration) -> DocModelResult<()> {
        self.entry_mut::<T>(|entry| {
            if !entry.indexes.contains(&index) {
                entry.indexes.push(index);
            }
            Ok(())
        })
    }

    /// Sets the options used to assemble `T`'s field-based schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::SchemaConflict`] if `T` uses a custom schema.
    pub fn define_schema<T: 'static>(&mut self, options: ClassOptions) -> DocModelResult<()> {
        self.entry_mut::<T>(|entry| {
            entry.set_source(SchemaSource::FieldBased)?;
            entry.options = options;
            Ok(())
        })
    }

    /// Supplies `T`'s whole schema instead of assembling it from fields.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::SchemaConflict`] if fields were declared on `T`, or
    /// [`DocModelError::Declaration`] if the schema is not an object schema.
    pub fn define_custom_schema<T: 'static>(&mut self, schema: Schema) -> DocModelResult<()> {
        if schema.schema_type != crate::schema::SchemaType::Object {
            return Err(DocModelError::Declaration(format!(
                "custom schema of {} must be an object schema, got {}",
                ClassRef::of::<T>().name(),
                schema.schema_type
            )));
        }

        self.entry_mut::<T>(|entry| {
            entry.set_source(SchemaSource::CustomSchema)?;
            entry.custom_schema = Some(schema);
            Ok(())
        })
    }

    /// Binds `T` to a collection.
    ///
    /// A class without a declared schema style becomes field-based.
    pub fn define_collection<T: 'static>(
        &mut self,
        options: CollectionOptions,
    ) -> DocModelResult<()> {
        self.entry_mut::<T>(|entry| {
            if entry.source == SchemaSource::Undeclared {
                entry.source = SchemaSource::FieldBased;
            }
            entry.collection = Some(options);
            Ok(())
        })
    }

    pub fn class_schema<T: 'static>(&self) -> Option<&ClassSchema> {
        self.class_schema_by_id(TypeId::of::<T>())
    }

    pub fn class_schema_by_id(&self, type_id: TypeId) -> Option<&ClassSchema> {
        self.classes
            .get(&type_id)
            .and_then(|entry| entry.assembled.as_ref())
    }

    /// Returns the class schema of `T`, which must be bound to a collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::NotACollection`] otherwise.
    pub fn collection_schema<T: 'static>(&self) -> DocModelResult<&ClassSchema> {
        let class = ClassRef::of::<T>();

        match self.class_schema::<T>() {
            Some(schema) if schema.collection.is_some() => Ok(schema),
            _ => Err(DocModelError::NotACollection(class.name().to_string())),
        }
    }

    /// The internal schema of `T`, if declared.
    pub fn schema_of<T: 'static>(&self) -> Option<&Schema> {
        self.schema_by_id(TypeId::of::<T>())
    }

    pub fn schema_by_id(&self, type_id: TypeId) -> Option<&Schema> {
        self.class_schema_by_id(type_id).map(|class| &class.schema)
    }

    pub fn relation_by_id(&self, type_id: TypeId, property: &str) -> Option<&RelationDeclaration> {
        self.classes.get(&type_id).and_then(|entry| {
            entry
                .relations
                .iter()
                .find(|(name, _)| name == property)
                .map(|(_, relation)| relation)
        })
    }

    pub fn indexes_by_id(&self, type_id: TypeId) -> &[IndexDeclaration] {
        self.classes
            .get(&type_id)
            .map(|entry| entry.indexes.as_slice())
            .unwrap_or_default()
    }

    /// Classes bound to a collection.
    pub fn collections(&self) -> impl Iterator<Item = &ClassSchema> {
        self.classes
            .values()
            .filter_map(|entry| entry.assembled.as_ref())
            .filter(|class| class.collection.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::SimpleType, model::ValidationPolicy, relation::RelationKind, schema::PropertyMask,
        serializer::Serializer,
    };
    use bson::Bson;
    use serde::{Deserialize, Serialize};

    fn optional<T: Model>() -> FieldOptions {
        FieldOptions::of(SimpleType::model::<T>().optional())
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    impl Model for Address {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("city", FieldOptions::of("string"))?;
            catalog.define_schema::<Self>(ClassOptions::new())
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct User {
        name: String,
        address: Option<Address>,
    }

    impl Model for User {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
            catalog.define_field::<Self>("address", optional::<Address>())?;
            catalog.define_collection::<Self>(CollectionOptions::new().name("users"))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Post {
        title: String,
    }

    impl Model for Post {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("title", FieldOptions::new())?;
            catalog.define_relation::<Self>(
                "author",
                RelationOptions::one_to_one::<User>().local_field("authorId"),
            )?;
            catalog.define_index::<Self>(IndexDeclaration::single("title"))?;
            catalog.define_collection::<Self>(
                CollectionOptions::new().validation(ValidationPolicy::new()),
            )
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Category {
        name: String,
        parent: Option<Box<Category>>,
        description: Option<String>,
    }

    impl Model for Category {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
            catalog.define_field::<Self>("parent", optional::<Category>())?;
            let description = FieldOptions::of("string").required(false);
            catalog.define_field::<Self>("description", description)?;
            catalog.define_collection::<Self>(CollectionOptions::new().name("categories"))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Team {
        name: String,
        lead: Option<Box<Member>>,
    }

    impl Model for Team {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
            catalog.define_field::<Self>("lead", optional::<Member>())?;
            catalog.define_schema::<Self>(ClassOptions::new())
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Member {
        name: String,
        team: Option<Box<Team>>,
    }

    impl Model for Member {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
            catalog.define_field::<Self>("team", optional::<Team>())?;
            catalog.define_schema::<Self>(ClassOptions::new())
        }
    }

    #[test]
    fn assembles_nested_model_schemas() {
        let mut catalog = Catalog::new();
        catalog.declare::<User>().unwrap();

        let class = catalog.collection_schema::<User>().unwrap();
        let address = Schema::object()
            .class(ClassRef::of::<Address>())
            .property("city", Schema::string())
            .required(["city"]);

        assert_eq!(class.name, "User");
        assert_eq!(class.collection.as_ref().unwrap().name, "users");
        assert_eq!(
            class.schema,
            Schema::object()
                .class(ClassRef::of::<User>())
                .property("name", Schema::string())
                .property("address", address)
                .required(["name"])
        );
    }

    #[test]
    fn relations_register_non_required_fields() {
        let mut catalog = Catalog::new();
        catalog.declare::<Post>().unwrap();

        let class = catalog.collection_schema::<Post>().unwrap();
        let author = class.schema.properties.as_ref().unwrap().get("author").unwrap();

        assert_eq!(author.class, Some(ClassRef::of::<User>()));
        assert_eq!(class.schema.required, vec!["title".to_string()]);
        assert_eq!(class.collection.as_ref().unwrap().name, "Post");

        let relation = catalog.relation_by_id(TypeId::of::<Post>(), "author").unwrap();
        assert_eq!(relation.kind, RelationKind::OneToOne);
        assert_eq!(relation.local_field, "authorId");
        assert_eq!(relation.foreign_field, "_id");

        assert_eq!(catalog.indexes_by_id(TypeId::of::<Post>()).len(), 1);
    }

    #[test]
    fn declaring_twice_is_idempotent() {
        let mut catalog = Catalog::new();
        catalog.declare::<Post>().unwrap();
        let first = catalog.class_schema::<Post>().cloned();

        catalog.declare::<Post>().unwrap();
        catalog.define_field::<Post>("title", FieldOptions::new()).unwrap();

        assert_eq!(catalog.class_schema::<Post>().cloned(), first);
        assert_eq!(catalog.indexes_by_id(TypeId::of::<Post>()).len(), 1);
    }

    #[test]
    fn custom_and_field_based_styles_conflict() {
        let mut catalog = Catalog::new();
        catalog.define_field::<Address>("city", FieldOptions::of("string")).unwrap();

        let err = catalog
            .define_custom_schema::<Address>(Schema::object().property("city", Schema::string()))
            .unwrap_err();
        assert!(matches!(err, DocModelError::SchemaConflict(_)));

        let mut catalog = Catalog::new();
        catalog.define_custom_schema::<Address>(Schema::object()).unwrap();
        let err = catalog.define_field::<Address>("city", FieldOptions::new()).unwrap_err();
        assert!(matches!(err, DocModelError::SchemaConflict(_)));
    }

    #[test]
    fn custom_schema_can_be_bound_to_a_collection() {
        let mut catalog = Catalog::new();
        let schema = Schema::object()
            .property("city", Schema::string())
            .additional_properties(true);
        catalog.define_custom_schema::<Address>(schema).unwrap();
        catalog.define_collection::<Address>(CollectionOptions::new().name("addresses")).unwrap();

        let class = catalog.collection_schema::<Address>().unwrap();
        assert_eq!(class.source, SchemaSource::CustomSchema);
        assert_eq!(class.schema.class, Some(ClassRef::of::<Address>()));
    }

    #[test]
    fn inherited_properties_are_used_when_enabled() {
        let mut catalog = Catalog::new();
        catalog
            .define_property::<Address>("zip", Schema::string().title("zip code"), false)
            .unwrap();
        catalog.define_property::<Address>("city", Schema::string().title("city"), true).unwrap();
        catalog.define_field::<Address>("city", FieldOptions::new().required(false)).unwrap();
        let options = ClassOptions::new().use_property_schemas(true).description("postal");
        catalog.define_schema::<Address>(options).unwrap();

        let schema = catalog.schema_of::<Address>().unwrap();
        let properties = schema.properties.as_ref().unwrap();

        assert_eq!(properties.names().collect::<Vec<_>>(), vec!["zip", "city"]);
        assert_eq!(properties.get("city").unwrap().title.as_deref(), Some("city"));
        assert!(schema.required.is_empty());
        assert_eq!(schema.description.as_deref(), Some("postal"));
    }

    #[test]
    fn unbound_classes_are_not_collections() {
        let mut catalog = Catalog::new();
        catalog.declare::<Address>().unwrap();

        let err = catalog.collection_schema::<Address>().unwrap_err();
        assert_eq!(err.to_string(), "class Address has not been bound to a collection");
    }

    #[test]
    fn self_references_keep_fields_declared_later() {
        let mut catalog = Catalog::new();
        catalog.declare::<Category>().unwrap();

        let schema = catalog.schema_of::<Category>().unwrap();
        let parent = schema.properties.as_ref().unwrap().get("parent").unwrap();
        assert_eq!(
            parent,
            &Schema::object().class(ClassRef::of::<Category>()).additional_properties(true)
        );

        let value = Bson::Document(bson::doc! {
            "name": "leaf",
            "parent": { "name": "root", "description": "top level" },
            "description": "bottom level",
        });
        let stored = Serializer::new(&catalog)
            .serialize(schema, Some(&value), &PropertyMask::default())
            .unwrap();
        assert_eq!(stored, Some(value));
    }

    #[test]
    fn mutual_references_resolve_both_ways() {
        let mut catalog = Catalog::new();
        catalog.declare::<Team>().unwrap();

        let team = catalog.schema_of::<Team>().unwrap();
        let lead = team.properties.as_ref().unwrap().get("lead").unwrap();
        assert_eq!(lead, catalog.schema_of::<Member>().unwrap());

        let member = catalog.schema_of::<Member>().unwrap();
        let back = member.properties.as_ref().unwrap().get("team").unwrap();
        let open = Schema::object().class(ClassRef::of::<Team>()).additional_properties(true);
        assert_eq!(back, &open);

        let value = Bson::Document(bson::doc! {
            "name": "core",
            "lead": { "name": "ada", "team": { "name": "core", "motto": "ship it" } },
        });
        let stored = Serializer::new(&catalog)
            .serialize(team, Some(&value), &PropertyMask::default())
            .unwrap();
        assert_eq!(stored, Some(value));
    }
}
