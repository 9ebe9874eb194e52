use bson::{Bson, Document};

use super::{TypeHandler, TypeRegistry, describe, storage_node};
use crate::{
    error::{DocModelError, DocModelResult},
    schema::{Items, PropertyMask, Schema},
};

const ARRAY_KEYWORDS: &[&str] = &["minItems", "maxItems", "uniqueItems", "additionalItems"];

/// Arrays with uniform or tuple-form items.
///
/// Tuple-form arrays may not be longer than the tuple: an element without a positional
/// schema is rejected rather than passed through. Item errors are prefixed with the
/// element index, e.g. `[1]should be number, got "b"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayType;

impl ArrayType {
    fn elements<'a>(value: &'a Bson) -> DocModelResult<&'a Vec<Bson>> {
        match value {
            Bson::Array(elements) => Ok(elements),
            other => Err(DocModelError::validation(format!("Invalid array: {}", describe(other)))),
        }
    }

    fn item_schema(schema: &Schema, index: usize) -> DocModelResult<Option<&Schema>> {
        match &schema.items {
            None => Ok(None),
            Some(Items::Uniform(item)) => Ok(Some(item)),
            Some(Items::Tuple(items)) => items.get(index).map(Some).ok_or_else(|| {
                DocModelError::validation(format!(
                    "[{}]exceeds tuple length of {}",
                    index,
                    items.len()
                ))
            }),
        }
    }

    /// Applies `convert` to every element, positionally matched against the item schemas.
    fn map_elements<F>(value: &Bson, schema: &Schema, mut convert: F) -> DocModelResult<Bson>
    where
        F: FnMut(&Bson, &Schema) -> DocModelResult<Option<Bson>>,
    {
        let elements = Self::elements(value)?;
        let mut out = Vec::with_capacity(elements.len());

        for (index, element) in elements.iter().enumerate() {
            match Self::item_schema(schema, index)? {
                Some(item) => {
                    let converted =
                        convert(element, item).map_err(|e| e.at(format!("[{}]", index), ""))?;
                    out.push(converted.unwrap_or(Bson::Null));
                }
                None => out.push(element.clone()),
            }
        }

        Ok(Bson::Array(out))
    }
}

impl TypeHandler for ArrayType {
    fn validate(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        _mask: &PropertyMask,
    ) -> DocModelResult<()> {
        let Some(value) = value else {
            return Ok(());
        };

        for (index, element) in Self::elements(value)?.iter().enumerate() {
            if let Some(item) = Self::item_schema(schema, index)? {
                registry
                    .validate(Some(element), item, &PropertyMask::default())
                    .map_err(|e| e.at(format!("[{}]", index), ""))?;
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
            Some(value) => Self::map_elements(value, schema, |element, item| {
                registry.serialize(Some(element), item, &PropertyMask::default())
            })
            .map(Some),
        }
    }

    fn deserialize(
        &self,
        registry: &TypeRegistry,
        value: Option<&Bson>,
        schema: &Schema,
        _mask: &PropertyMask,
    ) -> DocModelResult<Option<Bson>> {
        match value {
            None => Ok(schema.default.clone()),
            Some(value) => Self::map_elements(value, schema, |element, item| {
                registry.deserialize(Some(element), item, &PropertyMask::default())
            })
            .map(Some),
        }
    }

    fn to_storage_schema(
        &self,
        registry: &TypeRegistry,
        schema: &Schema,
    ) -> DocModelResult<Document> {
        let mut node = storage_node(Some("array"), schema, ARRAY_KEYWORDS);

        match &schema.items {
            Some(Items::Uniform(item)) => {
                node.insert("items", registry.to_storage_schema(item)?);
            }
            Some(Items::Tuple(items)) => {
                let items = items
                    .iter()
                    .map(|item| registry.to_storage_schema(item).map(Bson::Document))
                    .collect::<DocModelResult<Vec<_>>>()?;
                node.insert("items", items);
            }
            None => {}
        }

        Ok(node)
    }
}
