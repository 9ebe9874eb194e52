//! Filter evaluation for in-memory document matching.
//!
//! Evaluates native filter documents against stored documents, following the matching
//! rules of the server for the supported operators: dotted paths traverse embedded
//! documents and arrays, and a condition on an array field matches when the array itself
//! or any of its elements satisfies it.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};
use std::{cmp::Ordering, collections::HashMap};

use docmodel_core::error::{DocModelError, DocModelResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`, so `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

fn equals(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Values found at a dotted `path`.
///
/// Arrays met on the way are traversed: numeric segments index into them, other segments
/// are applied to each embedded document.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    match (document.get(head), rest) {
        (None, _) => Vec::new(),
        (Some(value), None) => vec![value],
        (Some(value), Some(rest)) => resolve_value(value, rest),
    }
}

fn resolve_value<'a>(value: &'a Bson, path: &str) -> Vec<&'a Bson> {
    match value {
        Bson::Document(document) => resolve(document, path),
        Bson::Array(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };

            if let Ok(index) = head.parse::<usize>() {
                return match (items.get(index), rest) {
                    (None, _) => Vec::new(),
                    (Some(item), None) => vec![item],
                    (Some(item), Some(rest)) => resolve_value(item, rest),
                };
            }

            items
                .iter()
                .filter_map(Bson::as_document)
                .flat_map(|document| resolve(document, path))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// The values a condition is tested against: each value and, for arrays, its elements.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }
    expanded
}

fn operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(document) if !document.is_empty() => document
            .keys()
            .all(|key| key.starts_with('$'))
            .then_some(document),
        _ => None,
    }
}

fn unsupported(operator: &str) -> DocModelError {
    DocModelError::Backend(format!("unknown operator: {}", operator))
}

fn clauses<'a>(operator: &str, value: &'a Bson) -> DocModelResult<Vec<&'a Document>> {
    let Bson::Array(items) = value else {
        return Err(DocModelError::Backend(format!("{} must be an array", operator)));
    };

    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                DocModelError::Backend(format!("{} entries must be objects", operator))
            })
        })
        .collect()
}

fn regex(pattern: &Bson, options: Option<&Bson>) -> DocModelResult<Regex> {
    let (pattern, mut flags) = match pattern {
        Bson::String(pattern) => (pattern.as_str(), String::new()),
        Bson::RegularExpression(regex) => {
            (regex.pattern.as_str(), regex.options.as_str().to_string())
        }
        other => {
            let message = format!("$regex has to be a string, got {}", other);
            return Err(DocModelError::Backend(message));
        }
    };
    if let Some(Bson::String(options)) = options {
        flags.push_str(options);
    }

    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|err| DocModelError::Backend(err.to_string()))
}

/// Matches stored documents against native filters.
pub struct FilterEvaluator<'a> {
    document: &'a Document,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns whether the document satisfies `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Backend`] for unsupported or malformed operators.
    pub fn matches(&self, filter: &Document) -> DocModelResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in clauses(key, condition)? {
                        if !self.matches(clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for clause in clauses(key, condition)? {
                        if self.matches(clause)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$nor" => {
                    let mut none = true;
                    for clause in clauses(key, condition)? {
                        if self.matches(clause)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                operator if operator.starts_with('$') => return Err(unsupported(operator)),
                path => self.matches_field(path, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Keeps the documents matching `filter`, in order.
    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        filter: &Document,
    ) -> DocModelResult<Vec<&'d Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if FilterEvaluator::new(document).matches(filter)? {
                matched.push(document);
            }
        }
        Ok(matched)
    }

    fn matches_field(&self, path: &str, condition: &Bson) -> DocModelResult<bool> {
        let values = resolve(self.document, path);

        match operator_document(condition) {
            Some(operators) => Self::matches_operators(&values, operators),
            None => Ok(Self::matches_eq(&values, condition)),
        }
    }

    fn matches_eq(values: &[&Bson], target: &Bson) -> bool {
        if values.is_empty() {
            return matches!(target, Bson::Null);
        }
        expand(values).into_iter().any(|value| equals(value, target))
    }

    fn matches_in(values: &[&Bson], targets: &Bson) -> DocModelResult<bool> {
        let Bson::Array(targets) = targets else {
            return Err(DocModelError::Backend("$in needs an array".to_string()));
        };

        Ok(targets.iter().any(|target| Self::matches_eq(values, target)))
    }

    fn matches_order(values: &[&Bson], target: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let target = Comparable::from(target);

        expand(values)
            .into_iter()
            .any(|value| Comparable::from(value).partial_cmp(&target).is_some_and(accept))
    }

    fn matches_operators(values: &[&Bson], operators: &Document) -> DocModelResult<bool> {
        for (operator, argument) in operators {
            let matched = match operator.as_str() {
                "$eq" => Self::matches_eq(values, argument),
                "$ne" => !Self::matches_eq(values, argument),
                "$gt" => Self::matches_order(values, argument, |o| o == Ordering::Greater),
                "$gte" => Self::matches_order(values, argument, |o| o != Ordering::Less),
                "$lt" => Self::matches_order(values, argument, |o| o == Ordering::Less),
                "$lte" => Self::matches_order(values, argument, |o| o != Ordering::Greater),
                "$in" => Self::matches_in(values, argument)?,
                "$nin" => !Self::matches_in(values, argument)?,
                "$exists" => {
                    let should_exist = match argument {
                        Bson::Boolean(flag) => *flag,
                        Bson::Int32(n) => *n != 0,
                        Bson::Int64(n) => *n != 0,
                        _ => true,
                    };
                    values.is_empty() != should_exist
                }
                "$not" => {
                    let inner = match argument {
                        Bson::Document(inner) => inner.clone(),
                        Bson::RegularExpression(_) => bson::doc! { "$regex": argument.clone() },
                        other => {
                            let message =
                                format!("$not needs a regex or a document, got {}", other);
                            return Err(DocModelError::Backend(message));
                        }
                    };
                    !Self::matches_operators(values, &inner)?
                }
                "$regex" => {
                    let regex = regex(argument, operators.get("$options"))?;
                    expand(values)
                        .into_iter()
                        .filter_map(Bson::as_str)
                        .any(|value| regex.is_match(value))
                }
                "$options" => true,
                "$all" => {
                    let Bson::Array(required) = argument else {
                        return Err(DocModelError::Backend("$all needs an array".to_string()));
                    };
                    !required.is_empty()
                        && required.iter().all(|target| Self::matches_eq(values, target))
                }
                "$size" => {
                    let size = match argument {
                        Bson::Int32(n) => i64::from(*n),
                        Bson::Int64(n) => *n,
                        other => {
                            let message = format!("$size needs a number, got {}", other);
                            return Err(DocModelError::Backend(message));
                        }
                    };
                    values.iter().any(|value| {
                        matches!(value, Bson::Array(items) if items.len() as i64 == size)
                    })
                }
                other => return Err(unsupported(other)),
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Orders two documents by a native sort specification (`{ field: 1 | -1, ... }`).
///
/// Missing and null values sort first in ascending order.
pub(crate) fn compare(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let left_value = resolve(left, path).into_iter().next();
        let right_value = resolve(right, path).into_iter().next();

        let ordering = match (left_value, right_value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => Comparable::from(a)
                .partial_cmp(&Comparable::from(b))
                .unwrap_or(Ordering::Equal),
        };

        let descending = matches!(direction, Bson::Int32(n) if *n < 0)
            || matches!(direction, Bson::Int64(n) if *n < 0)
            || matches!(direction, Bson::Double(n) if *n < 0.0);
        let ordering = if descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Distinct values at `path`, array elements counted individually.
pub(crate) fn distinct<'d>(
    documents: impl IntoIterator<Item = &'d Document>,
    path: &str,
) -> Vec<Bson> {
    let mut values: Vec<Bson> = Vec::new();

    for document in documents {
        for value in resolve(document, path) {
            let candidates = match value {
                Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            };
            for candidate in candidates {
                if !values.iter().any(|seen| equals(seen, candidate)) {
                    values.push(candidate.clone());
                }
            }
        }
    }
    values
}

/// Whether two values are equal under the matching rules.
pub(crate) fn same(left: &Bson, right: &Bson) -> bool {
    equals(left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: Document, filter: Document) -> bool {
        FilterEvaluator::new(&document).matches(&filter).unwrap()
    }

    #[test]
    fn equality_matches_arrays_and_nested_paths() {
        let document = doc! { "name": "ada", "tags": ["a", "b"], "address": { "city": "Paris" } };

        assert!(matches(document.clone(), doc! { "name": "ada" }));
        assert!(matches(document.clone(), doc! { "tags": "b" }));
        assert!(matches(document.clone(), doc! { "address.city": "Paris" }));
        assert!(!matches(document.clone(), doc! { "address.city": "Rome" }));
        assert!(matches(document, doc! { "missing": null }));
    }

    #[test]
    fn comparison_and_set_operators() {
        let document = doc! { "age": 36, "score": 1.5, "tags": ["x", "y"] };

        assert!(matches(document.clone(), doc! { "age": { "$gt": 30, "$lte": 36 } }));
        assert!(matches(document.clone(), doc! { "score": { "$gte": 1 } }));
        assert!(matches(document.clone(), doc! { "age": { "$in": [1, 36] } }));
        assert!(matches(document.clone(), doc! { "age": { "$nin": [1, 2] } }));
        assert!(matches(document.clone(), doc! { "tags": { "$all": ["y", "x"] } }));
        assert!(matches(document.clone(), doc! { "tags": { "$size": 2 } }));
        assert!(!matches(document, doc! { "age": { "$ne": 36 } }));
    }

    #[test]
    fn logical_operators_and_existence() {
        let document = doc! { "a": 1, "b": null };

        assert!(matches(document.clone(), doc! { "$or": [{ "a": 2 }, { "a": 1 }] }));
        assert!(matches(document.clone(), doc! { "$nor": [{ "a": 2 }] }));
        assert!(!matches(document.clone(), doc! { "$and": [{ "a": 1 }, { "a": 2 }] }));
        let exists = doc! { "b": { "$exists": true }, "c": { "$exists": false } };
        assert!(matches(document.clone(), exists));
        assert!(matches(document, doc! { "a": { "$not": { "$gt": 5 } } }));
    }

    #[test]
    fn regex_honors_options() {
        let document = doc! { "name": "Alice" };

        assert!(matches(document.clone(), doc! { "name": { "$regex": "^al", "$options": "i" } }));
        assert!(!matches(document.clone(), doc! { "name": { "$regex": "^al" } }));
        let not_bob = doc! { "name": { "$not": { "$regex": "bob", "$options": "i" } } };
        assert!(matches(document, not_bob));
    }

    #[test]
    fn unknown_operators_fail() {
        let document = doc! { "a": 1 };

        assert!(FilterEvaluator::new(&document).matches(&doc! { "a": { "$near": 1 } }).is_err());
        assert!(FilterEvaluator::new(&document).matches(&doc! { "$where": "x" }).is_err());
    }

    #[test]
    fn sorts_missing_values_first() {
        let mut documents = vec![doc! { "n": 2 }, doc! {}, doc! { "n": 1 }];
        documents.sort_by(|a, b| compare(a, b, &doc! { "n": 1 }));
        assert_eq!(documents, vec![doc! {}, doc! { "n": 1 }, doc! { "n": 2 }]);

        documents.sort_by(|a, b| compare(a, b, &doc! { "n": -1 }));
        assert_eq!(documents[0], doc! { "n": 2 });
    }

    #[test]
    fn distinct_flattens_arrays() {
        let documents = [doc! { "t": ["a", "b"] }, doc! { "t": "a" }, doc! { "t": 1 }];
        assert_eq!(
            distinct(&documents, "t"),
            vec![Bson::String("a".into()), Bson::String("b".into()), Bson::Int32(1)]
        );
    }
}
