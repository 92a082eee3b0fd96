//! Typed predicates and updates understood by every store backend.

use serde_json::Value;

use super::Document;

/// Document predicate. Field names may be dotted paths (`address.city`).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document.
    All,

    /// Field present and equal to the value.
    Eq(String, Value),

    /// Field absent or different from the value.
    Ne(String, Value),

    /// Field present and equal to one of the values.
    In(String, Vec<Value>),

    /// Field present (even if null) when `true`, absent when `false`.
    Exists(String, bool),

    /// Field absent or null.
    IsNull(String),

    /// Field present and not null.
    NotNull(String),

    /// Every sub-filter matches. Empty matches everything.
    And(Vec<Filter>),

    /// Some sub-filter matches. Empty matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(field.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn exists(field: &str) -> Self {
        Filter::Exists(field.to_string(), true)
    }

    pub fn missing(field: &str) -> Self {
        Filter::Exists(field.to_string(), false)
    }

    pub fn is_null(field: &str) -> Self {
        Filter::IsNull(field.to_string())
    }

    pub fn not_null(field: &str) -> Self {
        Filter::NotNull(field.to_string())
    }

    /// Evaluate against one document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => lookup(doc, field) == Some(value),
            Filter::Ne(field, value) => lookup(doc, field) != Some(value),
            Filter::In(field, values) => {
                lookup(doc, field).is_some_and(|found| values.contains(found))
            }
            Filter::Exists(field, wanted) => lookup(doc, field).is_some() == *wanted,
            Filter::IsNull(field) => lookup(doc, field).map_or(true, Value::is_null),
            Filter::NotNull(field) => lookup(doc, field).is_some_and(|v| !v.is_null()),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Top-level field assignments and removals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set.insert(field.to_string(), value.into());
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.unset.push(field.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Apply in place. Returns whether the document changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        for (field, value) in &self.set {
            if doc.get(field) != Some(value) {
                doc.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        for field in &self.unset {
            changed |= doc.remove(field).is_some();
        }
        changed
    }
}

/// One entry of a bulk update: apply `update` to every match of `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub filter: Filter,
    pub update: Update,
}

impl UpdateOp {
    pub fn new(filter: Filter, update: Update) -> Self {
        Self { filter, update }
    }
}
