//! Storage schema projection.
//!
//! Turns an internal [`Schema`] into the BSON-flavored JSON Schema dialect understood by
//! server-side document validators. Projection is pure: the same schema always yields the
//! same document.

use bson::{Document, doc};

use crate::{error::DocModelResult, schema::Schema, types::TypeRegistry};

/// Projects a schema through the registry.
#[derive(Debug, Clone, Copy)]
pub struct StorageProjector<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> StorageProjector<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// The storage schema of `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::UnknownType`](crate::error::DocModelError::UnknownType) if a
    /// nested type is not registered.
    pub fn project(&self, schema: &Schema) -> DocModelResult<Document> {
        self.registry.to_storage_schema(schema)
    }

    /// The validator document installed on a collection: `{ $jsonSchema: <storage schema> }`.
    pub fn validator(&self, schema: &Schema) -> DocModelResult<Document> {
        Ok(doc! { "$jsonSchema": self.project(schema)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::Catalog,
        error::DocModelResult,
        field::FieldOptions,
        model::{CollectionOptions, Model},
        relation::RelationOptions,
        schema::ClassRef,
    };
    use serde::{Deserialize, Serialize};

    struct Author;

    #[derive(Debug, Serialize, Deserialize)]
    struct Writer {
        name: String,
    }

    impl Model for Writer {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("name", FieldOptions::of("string"))?;
            catalog.define_collection::<Self>(CollectionOptions::new().name("writers"))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Book {
        title: String,
    }

    impl Model for Book {
        fn declare(catalog: &mut Catalog) -> DocModelResult<()> {
            catalog.define_field::<Self>("title", FieldOptions::of("string"))?;
            catalog.define_relation::<Self>("writer", RelationOptions::one_to_one::<Writer>())?;
            catalog.define_relation::<Self>(
                "coauthors",
                RelationOptions::one_to_many::<Writer>().foreign_field("bookId"),
            )?;
            catalog.define_collection::<Self>(CollectionOptions::new().name("books"))
        }
    }

    #[test]
    fn nested_class_schemas_project_their_own_properties() {
        let author = Schema::object()
            .class(ClassRef::of::<Author>())
            .property("_id", Schema::object_id())
            .property("name", Schema::string())
            .required(["name"]);
        let post = Schema::object()
            .property("title", Schema::string().constraint("maxLength", 120))
            .property("author", author)
            .property("tags", Schema::array(Schema::string()))
            .required(["title"]);

        let registry = TypeRegistry::with_builtins();
        let validator = StorageProjector::new(&registry).validator(&post).unwrap();

        assert_eq!(
            validator,
            doc! {
                "$jsonSchema": {
                    "bsonType": "object",
                    "properties": {
                        "title": { "bsonType": "string", "maxLength": 120 },
                        "author": {
                            "bsonType": "object",
                            "properties": {
                                "_id": { "bsonType": "objectId" },
                                "name": { "bsonType": "string" },
                            },
                            "required": ["name"],
                        },
                        "tags": { "bsonType": "array", "items": { "bsonType": "string" } },
                    },
                    "required": ["title"],
                }
            }
        );
    }

    #[test]
    fn declared_relations_project_the_target_schema() {
        let mut catalog = Catalog::new();
        catalog.declare::<Book>().unwrap();

        let schema = catalog.schema_of::<Book>().unwrap();
        let validator = StorageProjector::new(catalog.registry()).validator(schema).unwrap();

        let writer = doc! {
            "bsonType": "object",
            "properties": { "name": { "bsonType": "string" } },
            "required": ["name"],
        };
        assert_eq!(
            validator,
            doc! {
                "$jsonSchema": {
                    "bsonType": "object",
                    "properties": {
                        "title": { "bsonType": "string" },
                        "writer": writer.clone(),
                        "coauthors": { "bsonType": "array", "items": writer },
                    },
                    "required": ["title"],
                }
            }
        );
    }

    #[test]
    fn projection_is_pure() {
        let registry = TypeRegistry::with_builtins();
        let projector = StorageProjector::new(&registry);
        let schema = Schema::object().property("n", Schema::long().with_default(1i64));

        assert_eq!(projector.project(&schema).unwrap(), projector.project(&schema).unwrap());
    }
}
