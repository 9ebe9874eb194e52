//! Update operators for in-memory documents.

use bson::{Bson, Document};

use docmodel_core::error::{DocModelError, DocModelResult};

use crate::evaluator::resolve;

/// Returns `true` when `update` uses update operators rather than being a replacement.
pub(crate) fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn field_error(path: &str, message: &str) -> DocModelError {
    DocModelError::Backend(format!("cannot update '{}': {}", path, message))
}

/// Sets the value at a dotted `path`, creating intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocModelResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(child) => set_path(child, rest, value),
                Bson::Array(items) => {
                    let (index, tail) =
                        rest.split_once('.').map_or((rest, None), |(i, t)| (i, Some(t)));
                    let index = index
                        .parse::<usize>()
                        .map_err(|_| field_error(path, "array element needs a numeric index"))?;
                    if index > items.len() {
                        return Err(field_error(path, "array index is past the end"));
                    }
                    if index == items.len() {
                        items.push(Bson::Null);
                    }
                    match (tail, &mut items[index]) {
                        (None, slot) => {
                            *slot = value;
                            Ok(())
                        }
                        (Some(tail), Bson::Document(item)) => set_path(item, tail, value),
                        (Some(tail), slot) => {
                            let mut item = Document::new();
                            set_path(&mut item, tail, value)?;
                            *slot = Bson::Document(item);
                            Ok(())
                        }
                    }
                }
                _ => Err(field_error(path, "parent is not a document")),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

fn increment(current: Option<&Bson>, by: &Bson, path: &str) -> DocModelResult<Bson> {
    let current = current.cloned().unwrap_or(Bson::Int32(0));

    Ok(match (&current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(*a) + i64::from(*b))),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        _ => return Err(field_error(path, "$inc needs numeric values")),
    })
}

fn push(current: Option<&Bson>, argument: &Bson, path: &str) -> DocModelResult<Bson> {
    let mut items = match current {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(_) => return Err(field_error(path, "$push needs an array field")),
    };

    match argument {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => {
            match modifiers.get("$each") {
                Some(Bson::Array(each)) => items.extend(each.iter().cloned()),
                _ => return Err(field_error(path, "$each needs an array")),
            }
        }
        value => items.push(value.clone()),
    }

    Ok(Bson::Array(items))
}

/// Applies an operator update (`$set`, `$unset`, `$inc`, `$push`) to `document`.
///
/// # Errors
///
/// Returns [`DocModelError::Backend`] for unsupported operators, for attempts to change
/// `_id` and for type mismatches.
pub(crate) fn apply(document: &mut Document, update: &Document) -> DocModelResult<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DocModelError::Backend(format!("{} needs a document", operator)));
        };

        for (path, argument) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(field_error(path, "_id is immutable"));
            }
            let current = resolve(document, path).into_iter().next().cloned();

            match operator.as_str() {
                "$set" => set_path(document, path, argument.clone())?,
                "$unset" => unset_path(document, path),
                "$inc" => set_path(document, path, increment(current.as_ref(), argument, path)?)?,
                "$push" => set_path(document, path, push(current.as_ref(), argument, path)?)?,
                other => {
                    let message = format!("unknown update operator: {}", other);
                    return Err(DocModelError::Backend(message));
                }
            }
        }
    }

    Ok(())
}

/// The document an upsert starts from: the equality conditions of `filter`.
pub(crate) fn seed(filter: &Document) -> DocModelResult<Document> {
    let mut document = Document::new();

    for (path, condition) in filter {
        if path.starts_with('$') {
            continue;
        }
        match condition {
            Bson::Document(operators) if operators.keys().any(|key| key.starts_with('$')) => {
                if let Some(value) = operators.get("$eq") {
                    set_path(&mut document, path, value.clone())?;
                }
            }
            value => set_path(&mut document, path, value.clone())?,
        }
    }
    Ok(document)
}
