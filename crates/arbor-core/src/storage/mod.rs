//! # Backing Stores
//!
//! The engine persists into any ordered key-value store that implements
//! [`KvStore`]. Two ship with the crate:
//!
//! - [`MemoryStore`]: `BTreeMap`-backed, for tests and embedding
//! - [`RedbStore`]: disk-backed via redb
//!
//! Keys are strings; values are JSON. Listing is ordered by key bytes.
//! Stores are single-actor: the engine never locks, versions or retries.

mod redb_store;

pub use redb_store::RedbStore;

use crate::types::GraphError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Range/prefix selection for [`KvStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<String>,
    /// Exclusive upper bound.
    pub end: Option<String>,
    /// Descending key order.
    pub reverse: bool,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
}

impl ListOptions {
    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Every key starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Effective `(lower, upper)` bounds, or `None` when the range is empty.
    fn bounds(&self) -> Option<(Bound<&str>, Bound<&str>)> {
        let lower = match (self.start.as_deref(), self.prefix.as_deref()) {
            (Some(start), Some(prefix)) => Some(start.max(prefix)),
            (start, prefix) => start.or(prefix),
        };
        if let (Some(lower), Some(end)) = (lower, self.end.as_deref())
            && lower >= end
        {
            return None;
        }
        Some((
            lower.map_or(Bound::Unbounded, Bound::Included),
            self.end.as_deref().map_or(Bound::Unbounded, Bound::Excluded),
        ))
    }

    fn matches_prefix(&self, key: &str) -> bool {
        self.prefix.as_deref().is_none_or(|p| key.starts_with(p))
    }
}

/// An ordered key-value backing store.
pub trait KvStore {
    /// Read one value.
    fn get(&self, key: &str) -> Result<Option<Value>, GraphError>;

    /// Read several values; absent keys are left out of the result.
    fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Value>, GraphError> {
        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Write one value.
    fn put(&mut self, key: &str, value: Value) -> Result<(), GraphError>;

    /// Write several values.
    fn put_many(&mut self, entries: BTreeMap<String, Value>) -> Result<(), GraphError> {
        for (key, value) in entries {
            self.put(&key, value)?;
        }
        Ok(())
    }

    /// Remove one key. Returns `true` if it existed.
    fn delete(&mut self, key: &str) -> Result<bool, GraphError>;

    /// Remove several keys. Returns how many existed.
    fn delete_many(&mut self, keys: &[String]) -> Result<usize, GraphError> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// List entries in key order.
    fn list(&self, options: &ListOptions) -> Result<Vec<(String, Value)>, GraphError>;

    /// Remove every key.
    fn delete_all(&mut self) -> Result<(), GraphError>;
}

/// Boxed stores let hosts pick a backend at runtime.
impl<S: KvStore + ?Sized> KvStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, GraphError> {
        (**self).get(key)
    }

    fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Value>, GraphError> {
        (**self).get_many(keys)
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), GraphError> {
        (**self).put(key, value)
    }

    fn put_many(&mut self, entries: BTreeMap<String, Value>) -> Result<(), GraphError> {
        (**self).put_many(entries)
    }

    fn delete(&mut self, key: &str) -> Result<bool, GraphError> {
        (**self).delete(key)
    }

    fn delete_many(&mut self, keys: &[String]) -> Result<usize, GraphError> {
        (**self).delete_many(keys)
    }

    fn list(&self, options: &ListOptions) -> Result<Vec<(String, Value)>, GraphError> {
        (**self).list(options)
    }

    fn delete_all(&mut self) -> Result<(), GraphError> {
        (**self).delete_all()
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory store. Deterministic: `BTreeMap` ordering matches key byte order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, GraphError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), GraphError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, GraphError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn list(&self, options: &ListOptions) -> Result<Vec<(String, Value)>, GraphError> {
        let Some(bounds) = options.bounds() else {
            return Ok(Vec::new());
        };
        let matching = self
            .entries
            .range::<str, _>(bounds)
            .filter(|(key, _)| options.matches_prefix(key));
        let ordered: Box<dyn Iterator<Item = (&String, &Value)> + '_> = if options.reverse {
            Box::new(matching.rev())
        } else {
            Box::new(matching)
        };
        Ok(ordered
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete_all(&mut self) -> Result<(), GraphError> {
        self.entries.clear();
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
