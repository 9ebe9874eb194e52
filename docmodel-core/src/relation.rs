//! Relations between classes and their resolution.
//!
//! A relation is declared on a property of the owning class and names a target model plus
//! the local and foreign fields to match on (both default to `_id`). Declaring one also
//! declares the property itself as a non-required field typed as the target (one-to-one)
//! or an array of it (one-to-many).
//!
//! Relations are resolved in one of two ways:
//!
//! - **lookup**: `$lookup` (and, for one-to-one, `$unwind`) stages appended to a pipeline;
//! - **populate**: a follow-up find on the target collection whose result is assigned to
//!   the property of the already loaded parent.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{
    catalog::Catalog,
    error::{DocModelError, DocModelResult},
    field::{ModelRef, SimpleType},
    model::{ClassSchema, Model},
    schema::ClassRef,
};

pub const DEFAULT_RELATION_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// `one_to_one`, `has_one` or `belongs_to`.
    #[serde(alias = "has_one", alias = "belongs_to")]
    OneToOne,
    /// `one_to_many` or `has_many`.
    #[serde(alias = "has_many")]
    OneToMany,
}

impl FromStr for RelationKind {
    type Err = DocModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_to_one" | "has_one" | "belongs_to" => Ok(RelationKind::OneToOne),
            "one_to_many" | "has_many" => Ok(RelationKind::OneToMany),
            other => Err(DocModelError::Declaration(format!("unknown relation kind: {}", other))),
        }
    }
}

/// Options of a relation declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationOptions {
    pub kind: RelationKind,
    pub target: ModelRef,
    pub local_field: Option<String>,
    pub foreign_field: Option<String>,
}

impl RelationOptions {
    pub fn new(kind: RelationKind, target: ModelRef) -> Self {
        Self { kind, target, local_field: None, foreign_field: None }
    }

    pub fn one_to_one<T: Model>() -> Self {
        Self::new(RelationKind::OneToOne, ModelRef::of::<T>())
    }

    pub fn one_to_many<T: Model>() -> Self {
        Self::new(RelationKind::OneToMany, ModelRef::of::<T>())
    }

    pub fn local_field(mut self, field: impl Into<String>) -> Self {
        self.local_field = Some(field.into());
        self
    }

    pub fn foreign_field(mut self, field: impl Into<String>) -> Self {
        self.foreign_field = Some(field.into());
        self
    }

    /// The field shorthand implied for the relation property.
    pub(crate) fn field_type(&self) -> SimpleType {
        let target = SimpleType::Model(self.target);
        match self.kind {
            RelationKind::OneToOne => target,
            RelationKind::OneToMany => target.array(),
        }
    }

    pub(crate) fn into_declaration(self) -> RelationDeclaration {
        RelationDeclaration {
            kind: self.kind,
            target: self.target.class(),
            local_field: self.local_field.unwrap_or_else(|| DEFAULT_RELATION_FIELD.to_string()),
            foreign_field: self.foreign_field.unwrap_or_else(|| DEFAULT_RELATION_FIELD.to_string()),
        }
    }
}

/// A resolved relation declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDeclaration {
    pub kind: RelationKind,
    pub target: ClassRef,
    pub local_field: String,
    pub foreign_field: String,
}

impl RelationDeclaration {
    /// Pipeline stages joining the target collection into `property`.
    pub fn lookup_stages(&self, property: &str, target_collection: &str) -> Vec<Document> {
        let mut stages = vec![doc! {
            "$lookup": {
                "from": target_collection,
                "localField": self.local_field.as_str(),
                "foreignField": self.foreign_field.as_str(),
                "as": property,
            }
        }];

        if self.kind == RelationKind::OneToOne {
            stages.push(doc! {
                "$unwind": {
                    "path": format!("${}", property),
                    "preserveNullAndEmptyArrays": true,
                }
            });
        }

        stages
    }

    /// Filter selecting the related documents for a parent's local value.
    ///
    /// Returns `None` when the parent has no local value to match on.
    pub fn populate_filter(&self, local_value: Option<&Bson>) -> Option<Document> {
        match local_value {
            None | Some(Bson::Null) => None,
            Some(Bson::Array(values)) => {
                Some(doc! { self.foreign_field.as_str(): { "$in": values.clone() } })
            }
            Some(value) => Some(doc! { self.foreign_field.as_str(): value.clone() }),
        }
    }
}

/// A populate request resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatePlan<'a> {
    pub property: &'a str,
    pub relation: &'a RelationDeclaration,
    pub target: &'a ClassSchema,
}

/// Resolves relation declarations of one class.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'a> {
    catalog: &'a Catalog,
    owner: &'a ClassSchema,
}

impl<'a> RelationResolver<'a> {
    pub fn new(catalog: &'a Catalog, owner: &'a ClassSchema) -> Self {
        Self { catalog, owner }
    }

    /// Returns the relation declared on `property`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Relation`] if the property has no relation.
    pub fn relation(&self, property: &str) -> DocModelResult<&'a RelationDeclaration> {
        self.catalog
            .relation_by_id(self.owner.class.type_id(), property)
            .ok_or_else(|| {
                DocModelError::Relation(format!(
                    "{} has no relation declared on property {}",
                    self.owner.class.name(),
                    property
                ))
            })
    }

    fn target(&self, relation: &RelationDeclaration) -> DocModelResult<&'a ClassSchema> {
        self.catalog
            .class_schema_by_id(relation.target.type_id())
            .ok_or_else(|| DocModelError::NotACollection(relation.target.name().to_string()))
    }

    /// Lookup stages for every property in `properties`, in order.
    ///
    /// # Errors
    ///
    /// Fails if a property has no relation or its target is not bound to a collection.
    pub fn lookup<S: AsRef<str>>(&self, properties: &[S]) -> DocModelResult<Vec<Document>> {
        let mut stages = Vec::new();

        for property in properties {
            let property = property.as_ref();
            let relation = self.relation(property)?;
            let binding = self.target(relation)?.binding()?;

            stages.extend(relation.lookup_stages(property, &binding.name));
        }

        Ok(stages)
    }

    /// Resolves a populate request for `property`.
    ///
    /// # Errors
    ///
    /// Fails if the property has no relation or its target is not bound to a collection.
    pub fn populate(&self, property: &'a str) -> DocModelResult<PopulatePlan<'a>> {
        let relation = self.relation(property)?;
        let target = self.target(relation)?;
        target.binding()?;

        Ok(PopulatePlan { property, relation, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(kind: RelationKind) -> RelationDeclaration {
        RelationDeclaration {
            kind,
            target: ClassRef::of::<String>(),
            local_field: "authorId".into(),
            foreign_field: "_id".into(),
        }
    }

    #[test]
    fn one_to_one_lookup_unwinds() {
        let stages = relation(RelationKind::OneToOne).lookup_stages("author", "users");

        assert_eq!(
            stages,
            vec![
                doc! { "$lookup": {
                    "from": "users",
                    "localField": "authorId",
                    "foreignField": "_id",
                    "as": "author",
                } },
                doc! { "$unwind": { "path": "$author", "preserveNullAndEmptyArrays": true } },
            ]
        );
    }

    #[test]
    fn one_to_many_lookup_keeps_the_array() {
        let stages = relation(RelationKind::OneToMany).lookup_stages("comments", "comments");
        assert_eq!(stages.len(), 1);
    }

    #[test]
    fn populate_filter_matches_arrays_with_in() {
        let relation = relation(RelationKind::OneToMany);

        assert_eq!(
            relation.populate_filter(Some(&Bson::Array(vec![1.into(), 2.into()]))),
            Some(doc! { "_id": { "$in": [1, 2] } })
        );
        assert_eq!(relation.populate_filter(Some(&Bson::Int32(1))), Some(doc! { "_id": 1 }));
        assert_eq!(relation.populate_filter(Some(&Bson::Null)), None);
    }

    #[test]
    fn parses_relation_kind_aliases() {
        assert_eq!("belongs_to".parse::<RelationKind>().unwrap(), RelationKind::OneToOne);
        assert_eq!("has_many".parse::<RelationKind>().unwrap(), RelationKind::OneToMany);
        assert!("many_to_many".parse::<RelationKind>().is_err());
    }
}
