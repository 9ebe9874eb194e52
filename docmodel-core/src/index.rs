//! Index declarations.
//!
//! Declared per class and created when the class is registered with a data source. Keys
//! map a field to a direction (`1`, `-1`) or an index type (`"text"`, `"hashed"`, ...);
//! options are passed to the driver as given.

use bson::{Bson, Document};

use crate::error::{DocModelError, DocModelResult};

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDeclaration {
    keys: Document,
    options: Document,
}

impl IndexDeclaration {
    /// Ascending index on a single field.
    pub fn single(field: impl Into<String>) -> Self {
        let mut keys = Document::new();
        keys.insert(field.into(), 1);

        Self { keys, options: Document::new() }
    }

    /// Index over several fields, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::InvalidIndex`] if fewer than two fields are given.
    pub fn compound<I, K, V>(fields: I) -> DocModelResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bson>,
    {
        let mut keys = Document::new();
        for (field, spec) in fields {
            keys.insert(field.into(), spec.into());
        }

        if keys.len() < 2 {
            return Err(DocModelError::InvalidIndex(format!(
                "compound index requires at least two fields, got {}",
                keys.len()
            )));
        }

        Ok(Self { keys, options: Document::new() })
    }

    /// Replaces the spec of every key, e.g. `-1` or `"text"`.
    pub fn spec(mut self, spec: impl Into<Bson>) -> Self {
        let spec = spec.into();
        for (_, value) in self.keys.iter_mut() {
            *value = spec.clone();
        }
        self
    }

    pub fn unique(self) -> Self {
        self.option("unique", true)
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.option("name", name.into())
    }

    /// Adds a driver index option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn keys(&self) -> &Document {
        &self.keys
    }

    pub fn options(&self) -> &Document {
        &self.options
    }

    pub fn is_compound(&self) -> bool {
        self.keys.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn single_field_index_defaults_to_ascending() {
        let index = IndexDeclaration::single("email").unique();

        assert_eq!(index.keys(), &doc! { "email": 1 });
        assert_eq!(index.options(), &doc! { "unique": true });
        assert!(!index.is_compound());
    }

    #[test]
    fn spec_overrides_direction() {
        let index = IndexDeclaration::single("created").spec(-1).name("by_created");

        assert_eq!(index.keys(), &doc! { "created": -1 });
        assert_eq!(index.options(), &doc! { "name": "by_created" });
    }

    #[test]
    fn compound_index_needs_two_fields() {
        let err = IndexDeclaration::compound([("a", 1)]).unwrap_err();
        assert!(matches!(err, DocModelError::InvalidIndex(_)));

        let index = IndexDeclaration::compound([("a", 1), ("b", -1)]).unwrap();
        assert_eq!(index.keys(), &doc! { "a": 1, "b": -1 });
        assert!(index.is_compound());
    }
}
