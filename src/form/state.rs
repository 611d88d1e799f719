//! Execution state shared by a running form.
//!
//! `FormState` is the key-value store that field submissions and action
//! outputs land in. Loop data sources and condition expressions resolve
//! dotted paths against it. Path traversal descends through object maps
//! only: a numeric segment like `names.0` is NOT an array index and simply
//! fails to resolve (the list resolver relies on that falling through to
//! its literal fallback).

use std::collections::BTreeMap;

use serde_json::Value;

/// Mutable execution state for one running form.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    values: BTreeMap<String, Value>,
}

impl FormState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from key/value pairs.
    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Set a top-level value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Get a top-level value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Resolve a dotted path (`values.names`, `state.user.name`).
    ///
    /// The leading segment is looked up at the top level; every further
    /// segment descends into an object map. Any non-object intermediate
    /// (including arrays) stops resolution.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Whether a top-level key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over top-level entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the state holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
