//! Aggregation stages and projections over in-memory collections.
//!
//! Supported stages: `$match`, `$lookup`, `$unwind`, `$sort`, `$skip`, `$limit`,
//! `$project` and `$count`.

use bson::{Bson, Document};

use docmodel_core::error::{DocModelError, DocModelResult};

use crate::{
    evaluator::{FilterEvaluator, compare, resolve, same},
    update::set_path,
};

fn stage_error(stage: &str, message: impl AsRef<str>) -> DocModelError {
    DocModelError::Backend(format!("{}: {}", stage, message.as_ref()))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn count(stage: &str, value: &Bson) -> DocModelResult<usize> {
    let invalid = || stage_error(stage, format!("needs a non-negative integer, got {}", value));

    let n = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        _ => return Err(invalid()),
    };
    usize::try_from(n).map_err(|_| invalid())
}

/// Applies a projection document.
///
/// Inclusion projections keep the listed paths (and `_id` unless excluded); exclusion
/// projections drop the listed paths.
pub(crate) fn project(document: &Document, projection: &Document) -> DocModelResult<Document> {
    let inclusive = projection
        .iter()
        .any(|(path, flag)| path != "_id" && truthy(flag));

    if inclusive {
        let mut projected = Document::new();

        if projection.get("_id").is_none_or(truthy) {
            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }
        }
        for (path, flag) in projection {
            if path == "_id" {
                continue;
            }
            if !truthy(flag) {
                let message = format!("cannot exclude {} in inclusion projection", path);
                return Err(stage_error("$project", message));
            }
            if let Some(value) = resolve(document, path).into_iter().next() {
                set_path(&mut projected, path, value.clone())?;
            }
        }
        Ok(projected)
    } else {
        let mut projected = document.clone();

        for path in projection.keys() {
            remove_path(&mut projected, path);
        }
        Ok(projected)
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

fn string_field<'s>(spec: &'s Document, name: &str) -> DocModelResult<&'s str> {
    spec.get_str(name)
        .map_err(|_| stage_error("$lookup", format!("{} must be a string", name)))
}

fn lookup<'c>(
    documents: Vec<Document>,
    spec: &Document,
    collection: impl Fn(&str) -> Vec<&'c Document>,
) -> DocModelResult<Vec<Document>> {
    let from = string_field(spec, "from")?;
    let local_field = string_field(spec, "localField")?;
    let foreign_field = string_field(spec, "foreignField")?;
    let alias = string_field(spec, "as")?;
    let foreign = collection(from);

    Ok(documents
        .into_iter()
        .map(|mut document| {
            let local = keys(resolve(&document, local_field));
            let matched = foreign
                .iter()
                .filter(|candidate| {
                    let candidates = keys(resolve(candidate, foreign_field));
                    local.iter().any(|l| candidates.iter().any(|f| same(l, f)))
                })
                .map(|candidate| Bson::Document((*candidate).clone()))
                .collect::<Vec<_>>();

            document.insert(alias, Bson::Array(matched));
            document
        })
        .collect())
}

/// Join keys of a resolved value: array elements individually, missing as null.
fn keys(values: Vec<&Bson>) -> Vec<Bson> {
    if values.is_empty() {
        return vec![Bson::Null];
    }

    let mut keys = Vec::new();
    for value in values {
        match value {
            Bson::Array(items) => keys.extend(items.iter().cloned()),
            other => keys.push(other.clone()),
        }
    }
    keys
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> DocModelResult<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(spec) => (
            spec.get_str("path")
                .map_err(|_| stage_error("$unwind", "path must be a string"))?,
            spec.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        other => return Err(stage_error("$unwind", format!("invalid specification {}", other))),
    };
    let path = path
        .strip_prefix('$')
        .ok_or_else(|| stage_error("$unwind", "path must start with '$'"))?;

    let mut unwound = Vec::with_capacity(documents.len());
    for document in documents {
        match resolve(&document, path).into_iter().next().cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = document.clone();
                    set_path(&mut copy, path, item)?;
                    unwound.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    let mut copy = document;
                    remove_path(&mut copy, path);
                    unwound.push(copy);
                }
            }
            Some(_) => unwound.push(document),
        }
    }
    Ok(unwound)
}

/// Runs `pipeline` over `documents`.
///
/// `collection` resolves the documents of another collection of the same database, for
/// `$lookup`.
pub(crate) fn aggregate<'c>(
    mut documents: Vec<Document>,
    pipeline: &[Document],
    collection: impl Fn(&str) -> Vec<&'c Document>,
) -> DocModelResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(DocModelError::Backend(
                "a pipeline stage specification object must contain exactly one field".to_string(),
            ));
        };

        documents = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => {
                FilterEvaluator::filter_documents(&documents, filter)?
                    .into_iter()
                    .cloned()
                    .collect()
            }
            ("$lookup", Bson::Document(spec)) => lookup(documents, spec, &collection)?,
            ("$unwind", spec) => unwind(documents, spec)?,
            ("$sort", Bson::Document(sort)) => {
                documents.sort_by(|a, b| compare(a, b, sort));
                documents
            }
            ("$skip", n) => documents.into_iter().skip(count("$skip", n)?).collect(),
            ("$limit", n) => documents.into_iter().take(count("$limit", n)?).collect(),
            ("$project", Bson::Document(projection)) => documents
                .iter()
                .map(|document| project(document, projection))
                .collect::<DocModelResult<Vec<_>>>()?,
            ("$count", Bson::String(field)) => {
                let mut counted = Document::new();
                counted.insert(field.as_str(), documents.len() as i64);
                vec![counted]
            }
            (name, _) => return Err(stage_error(name, "unsupported stage")),
        };
    }

    Ok(documents)
}
