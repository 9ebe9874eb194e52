use bson::{Bson, Document};

use super::{TypeHandler, TypeRegistry, describe, storage_node};
use crate::{
    error::{DocModelError, DocModelResult},
    schema::{PropertyMask, Schema},
};

const OBJECT_KEYWORDS: &[&str] = &["minProperties", "maxProperties"];

/// Objects with declared properties.
///
/// A property holding `null` counts as absent. Required names are checked before any
/// property is validated. Undeclared properties survive serialization only when the schema
/// sets `additionalProperties`; an object schema without `properties` passes its value
/// through untouched.
///
/// The [`PropertyMask`] applies to the properties of this object only. Masked-out
/// properties are neither checked nor emitted, and nested objects are processed in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectType;

fn document<'a>(value: &'a Bson) -> DocModelResult<&'a Document> {
    match value {
        Bson::Document(document) => Ok(document),
        other => Err(DocModelError::validation(format!("Invalid object: {}", describe(other)))),
    }
}

fn property<'a>(document: &'a Document, name: &str) -> Option<&'a Bson> {
    match document.get(name) {
        Some(Bson::Null) | None => None,
        value => value,
    }
}

impl ObjectType {
    /// Converts every declared property with `convert` and carries undeclared ones over when
    /// the schema allows them.
    fn map_properties<F>(
        data: &Document,
        schema: &Schema,
        mask: &PropertyMask,
        mut convert: F,
    ) -> DocModelResult<Bson>
    where
        F: FnMut(Option<&Bson>, &Schema) -> DocModelResult<Option<Bson>>,
    {
        let Some(properties) = schema.properties.as_ref().filter(|p| !p.is_empty()) else {
            return Ok(Bson::Document(data.clone()));
        };

        let mut out = Document::new();

        for (name, property_schema) in properties.iter() {
            if !mask.allows(name) {
                continue;
            }

            let converted =
                convert(property(data, name), property_schema).map_err(|e| e.at(name, ": "))?;
            if let Some(value) = converted {
                out.insert(name, value);
            }
        }

        if schema.allows_additional_properties() {
            for (name, value) in data {
                if properties.contains(name) || !mask.allows(name) || matches!(value, Bson::Null) {
                    continue;
                }
                out.insert(name.clone(), value.clone());
            }
        }

        Ok(Bson::Document(out))
    }
}

impl TypeHandler for ObjectType {
    fn validate(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let data = document(value)?;

        for name in &schema.required {
            if mask.allows(name) && property(data, name).is_none() {
                return Err(DocModelError::validation(format!("{} is required", name)));
            }
        }

        if let Some(properties) = &schema.properties {
            for (name, property_schema) in properties.iter() {
                if !mask.allows(name) {
                    continue;
                }

                registry
                    .validate(property(data, name), property_schema, &PropertyMask::default())
                    .map_err(|e| e.at(name, ": "))?;
            }
        }

        Ok(())
    }

    fn serialize(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        self.validate(registry, value, schema, mask)?;

        match value {
            None => Ok(schema.default.clone()),
            Some(value) => {
                Self::map_properties(document(value)?, schema, mask, |value, property_schema| {
                    registry.serialize(value, property_schema, &PropertyMask::default())
                })
                .map(Some)
            }
        }
    }

    fn deserialize(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        match value {
            None => Ok(schema.default.clone()),
            Some(value) => {
                Self::map_properties(document(value)?, schema, mask, |value, property_schema| {
                    registry.deserialize(value, property_schema, &PropertyMask::default())
                })
                .map(Some)
            }
        }
    }

    fn to_storage_schema(
        &self,
        registry: &TypeRegistry,
        schema: &Schema,
    ) -> DocModelResult<Document> {
        let mut node = storage_node(Some("object"), schema, OBJECT_KEYWORDS);

        if let Some(properties) = &schema.properties {
            let mut projected = Document::new();
            for (name, property_schema) in properties.iter() {
                projected.insert(name, registry.to_storage_schema(property_schema)?);
            }
            node.insert("properties", projected);
        }
        if !schema.required.is_empty() {
            node.insert("required", schema.required.clone());
        }
        if let Some(additional) = schema.additional_properties {
            node.insert("additionalProperties", additional);
        }

        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn person() -> Schema {
        Schema::object()
            .property("name", Schema::string())
            .property("age", Schema::integer())
            .required(["name"])
    }

    fn serialize(
        schema: &Schema,
        value: Document,
        mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        TypeRegistry::with_builtins().serialize(Some(&Bson::Document(value)), schema, mask)
    }

    #[test]
    fn required_properties_are_enforced() {
        let registry = TypeRegistry::with_builtins();
        let schema = Schema::object().property("name", Schema::string()).required(["name"]);
        let mask = PropertyMask::new();

        let err = registry.validate(Some(&Bson::Document(doc! {})), &schema, &mask).unwrap_err();
        assert!(err.to_string().contains("name is required"));

        let err = registry
            .validate(Some(&Bson::Document(doc! { "name": Bson::Null })), &schema, &mask)
            .unwrap_err();
        assert!(err.to_string().contains("name is required"));

        let named = Bson::Document(doc! { "name": "a" });
        assert!(registry.validate(Some(&named), &schema, &mask).is_ok());
    }

    #[test]
    fn required_check_runs_before_property_validation() {
        let err = serialize(&person(), doc! { "age": "old" }, &PropertyMask::new()).unwrap_err();
        assert_eq!(err.to_string(), "name is required");
    }

    #[test]
    fn property_errors_carry_the_property_path() {
        let schema = Schema::object().property("author", person());
        let data = doc! { "author": { "name": "a", "age": "old" } };
        let err = serialize(&schema, data, &PropertyMask::new()).unwrap_err();

        assert_eq!(err.to_string(), "author: age: should be integer, got \"old\"");
    }

    #[test]
    fn additional_properties_pass_through_only_when_allowed() {
        let schema = Schema::object().property("name", Schema::string());
        let data = doc! { "name": "a", "extra": "x" };
        let out = serialize(&schema, data, &PropertyMask::new()).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "name": "a" })));

        let schema = schema.additional_properties(true);
        let data = doc! { "name": "a", "extra": "x" };
        let out = serialize(&schema, data, &PropertyMask::new()).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "name": "a", "extra": "x" })));
    }

    #[test]
    fn null_properties_are_dropped() {
        let data = doc! { "name": "a", "age": Bson::Null };
        let out = serialize(&person(), data, &PropertyMask::new()).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "name": "a" })));
    }

    #[test]
    fn include_and_exclude_mask_by_property_name() {
        let data = doc! { "name": "a", "age": 3 };

        let include = PropertyMask::new().include(["age"]);
        let out = serialize(&person(), data.clone(), &include).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "age": 3 })));

        let exclude = PropertyMask::new().exclude(["age"]);
        let out = serialize(&person(), data.clone(), &exclude).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "name": "a" })));

        // the masked-out name is not required
        let no_name = PropertyMask::new().exclude(["name"]);
        let out = serialize(&person(), doc! { "age": 3 }, &no_name).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "age": 3 })));

        // an excluded name is skipped even when its value is falsy
        let out = serialize(&person(), doc! { "name": "", "age": 0 }, &exclude).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "name": "" })));
    }

    #[test]
    fn schemas_without_properties_pass_values_through() {
        let data = doc! { "a": 1, "b": { "c": true } };
        let out = serialize(&Schema::object(), data, &PropertyMask::new()).unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "a": 1, "b": { "c": true } })));
    }

    #[test]
    fn deserialize_applies_property_defaults() {
        let schema = Schema::object()
            .property("name", Schema::string())
            .property("score", Schema::number().with_default(42));

        let out = TypeRegistry::with_builtins()
            .deserialize(Some(&Bson::Document(doc! { "name": "a" })), &schema, &PropertyMask::new())
            .unwrap();
        assert_eq!(out, Some(Bson::Document(doc! { "name": "a", "score": 42 })));
    }

    #[test]
    fn projects_properties_required_and_additional_properties() {
        let schema = person().additional_properties(false);

        assert_eq!(
            TypeRegistry::with_builtins().to_storage_schema(&schema).unwrap(),
            doc! {
                "bsonType": "object",
                "properties": {
                    "name": { "bsonType": "string" },
                    "age": { "bsonType": "int" },
                },
                "required": ["name"],
                "additionalProperties": false,
            }
        );
    }
}
