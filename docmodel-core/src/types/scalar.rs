use bson::{Bson, Document, oid::ObjectId};

use super::{TypeHandler, TypeRegistry, describe, storage_node};
use crate::{
    error::{DocModelError, DocModelResult},
    schema::{PropertyMask, Schema},
};

const NUMERIC_KEYWORDS: &[&str] = &[
    "multipleOf",
    "minimum",
    "exclusiveMinimum",
    "maximum",
    "exclusiveMaximum",
];
const STRING_KEYWORDS: &[&str] = &["minLength", "maxLength", "pattern"];

/// Implements [`TypeHandler`] for a leaf type given its normalization function.
///
/// `normalize` both checks a present value and produces its canonical form, which is
/// used on the way in and on the way out.
macro_rules! scalar_handler {
    ($name:ident, $bson_type:expr, $keywords:expr, $normalize:path) => {
        impl TypeHandler for $name {
            fn validate(
                &self,
                _registry: &TypeRegistry,
                value: Option<&Bson>,
                _schema: &Schema,
                _mask: &PropertyMask,
            ) -> DocModelResult<()> {
                match value {
                    None => Ok(()),
                    Some(value) => $normalize(value).map(|_| ()),
                }
            }

            fn serialize(
                &self,
                _registry: &TypeRegistry,
                value: Option<&Bson>,
                schema: &Schema,
                _mask: &PropertyMask,
            ) -> DocModelResult<Option<Bson>> {
                match value {
                    None => Ok(schema.default.clone()),
                    Some(value) => $normalize(value).map(Some),
                }
            }

            fn deserialize(
                &self,
                _registry: &TypeRegistry,
                value: Option<&Bson>,
                schema: &Schema,
                _mask: &PropertyMask,
            ) -> DocModelResult<Option<Bson>> {
                match value {
                    None => Ok(schema.default.clone()),
                    Some(value) => $normalize(value).map(Some),
                }
            }

            fn to_storage_schema(
                &self,
                _registry: &TypeRegistry,
                schema: &Schema,
            ) -> DocModelResult<Document> {
                Ok(storage_node($bson_type, schema, $keywords))
            }
        }
    };
}

/// Accepts any value, projects to an unconstrained node.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyType;

#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanType;

/// Any BSON number, stored as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberType;

/// 32-bit integers. 64-bit input within range is narrowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerType;

/// 64-bit integers. 32-bit input is widened.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongType;

/// BSON dates. RFC 3339 strings are accepted and normalized to native dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateType;

/// Object identifiers, given natively or in their 24-character hex form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdType;

fn mismatch(expected: &str, value: &Bson) -> DocModelError {
    DocModelError::validation(format!("should be {}, got {}", expected, describe(value)))
}

fn any(value: &Bson) -> DocModelResult<Bson> {
    Ok(value.clone())
}

fn string(value: &Bson) -> DocModelResult<Bson> {
    match value {
        Bson::String(_) => Ok(value.clone()),
        other => Err(mismatch("string", other)),
    }
}

fn boolean(value: &Bson) -> DocModelResult<Bson> {
    match value {
        Bson::Boolean(_) => Ok(value.clone()),
        other => Err(mismatch("boolean", other)),
    }
}

fn number(value: &Bson) -> DocModelResult<Bson> {
    match value {
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) => Ok(value.clone()),
        other => Err(mismatch("number", other)),
    }
}

fn integer(value: &Bson) -> DocModelResult<Bson> {
    match value {
        Bson::Int32(_) => Ok(value.clone()),
        Bson::Int64(n) => i32::try_from(*n)
            .map(Bson::Int32)
            .map_err(|_| DocModelError::validation(format!("{} is out of range for integer", n))),
        other => Err(mismatch("integer", other)),
    }
}

fn long(value: &Bson) -> DocModelResult<Bson> {
    match value {
        Bson::Int32(n) => Ok(Bson::Int64(i64::from(*n))),
        Bson::Int64(_) => Ok(value.clone()),
        other => Err(mismatch("long", other)),
    }
}

fn date(value: &Bson) -> DocModelResult<Bson> {
    let invalid = || DocModelError::validation(format!("invalid date value: {}", describe(value)));

    match value {
        Bson::DateTime(_) => Ok(value.clone()),
        Bson::String(text) => chrono::DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&chrono::Utc))
            .map(|parsed| Bson::DateTime(bson::DateTime::from_chrono(parsed)))
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn object_id(value: &Bson) -> DocModelResult<Bson> {
    match value {
        Bson::ObjectId(_) => Ok(value.clone()),
        Bson::String(hex) => ObjectId::parse_str(hex)
            .map(Bson::ObjectId)
            .map_err(|_| DocModelError::validation(format!("Invalid ObjectId: {}", hex))),
        other => Err(DocModelError::validation(format!("Invalid ObjectId: {}", other))),
    }
}

scalar_handler!(AnyType, None, &[], any);
scalar_handler!(StringType, Some("string"), STRING_KEYWORDS, string);
scalar_handler!(BooleanType, Some("bool"), &[], boolean);
scalar_handler!(NumberType, Some("number"), NUMERIC_KEYWORDS, number);
scalar_handler!(IntegerType, Some("int"), NUMERIC_KEYWORDS, integer);
scalar_handler!(LongType, Some("long"), NUMERIC_KEYWORDS, long);
scalar_handler!(DateType, Some("date"), &[], date);
scalar_handler!(ObjectIdType, Some("objectId"), &[], object_id);
