//! # Key-Value Cache
//!
//! The read-through, write-buffering layer every request works against.
//!
//! - A pending delete masks any buffered or stored value
//! - A pending put shadows the store
//! - Misses fall through to the store and are not retained
//! - Writes are issued to the store eagerly; the buffer only remembers them
//!
//! The final put/delete sets double as the request manifest. A cache lives
//! for exactly one request; nothing is shared across requests.

use crate::primitives::RESERVED_KEY_MARKER;
use crate::storage::{KvStore, ListOptions};
use crate::types::{GraphError, NodeRecord, Record, RelationshipRecord};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Per-request view over a backing store.
pub struct Cache<'s> {
    store: &'s mut dyn KvStore,
    puts: BTreeMap<String, Value>,
    deletes: BTreeSet<String>,
}

impl std::fmt::Debug for Cache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("puts", &self.puts.len())
            .field("deletes", &self.deletes.len())
            .finish_non_exhaustive()
    }
}

impl<'s> Cache<'s> {
    /// Start an empty buffer over `store`.
    pub fn new(store: &'s mut dyn KvStore) -> Self {
        Self {
            store,
            puts: BTreeMap::new(),
            deletes: BTreeSet::new(),
        }
    }

    // =========================================================================
    // RAW ACCESS
    // =========================================================================

    /// Read one key.
    pub fn one(&self, key: &str) -> Result<Option<Value>, GraphError> {
        if self.deletes.contains(key) {
            return Ok(None);
        }
        if let Some(value) = self.puts.get(key) {
            return Ok(Some(value.clone()));
        }
        self.store.get(key)
    }

    /// Read several keys; absent keys are left out.
    pub fn many(&self, keys: &[String]) -> Result<BTreeMap<String, Value>, GraphError> {
        let mut found = BTreeMap::new();
        let mut misses = Vec::new();
        for key in keys {
            if self.deletes.contains(key) {
                continue;
            }
            match self.puts.get(key) {
                Some(value) => {
                    found.insert(key.clone(), value.clone());
                }
                None => misses.push(key.clone()),
            }
        }
        if !misses.is_empty() {
            found.extend(self.store.get_many(&misses)?);
        }
        Ok(found)
    }

    /// Write one key.
    pub fn put(&mut self, key: &str, value: Value) -> Result<(), GraphError> {
        self.store.put(key, value.clone())?;
        self.deletes.remove(key);
        self.puts.insert(key.to_string(), value);
        Ok(())
    }

    /// Delete one key.
    pub fn delete(&mut self, key: &str) -> Result<(), GraphError> {
        self.store.delete(key)?;
        self.puts.remove(key);
        self.deletes.insert(key.to_string());
        Ok(())
    }

    /// List stored entries. Writes are eager, so the store view is current.
    pub fn list(&self, options: &ListOptions) -> Result<Vec<(String, Value)>, GraphError> {
        let mut entries = self.store.list(options)?;
        entries.retain(|(key, _)| !self.deletes.contains(key));
        Ok(entries)
    }

    /// Wipe the store and forget the buffer.
    pub fn delete_all(&mut self) -> Result<(), GraphError> {
        self.store.delete_all()?;
        self.puts.clear();
        self.deletes.clear();
        Ok(())
    }

    /// Keys deleted during this request (and not re-written since).
    pub fn deleted_keys(&self) -> impl Iterator<Item = &String> {
        self.deletes.iter()
    }

    /// Keys written during this request.
    pub fn written_keys(&self) -> impl Iterator<Item = &String> {
        self.puts.keys()
    }

    // =========================================================================
    // RECORDS
    // =========================================================================

    /// Read a stored record. Reserved keys are never records.
    pub fn record(&self, uid: &str) -> Result<Option<Record>, GraphError> {
        if uid.starts_with(RESERVED_KEY_MARKER) {
            return Ok(None);
        }
        self.one(uid)?.map(Record::from_value).transpose()
    }

    /// Read several records, keyed by id.
    pub fn records(&self, uids: &[String]) -> Result<BTreeMap<String, Record>, GraphError> {
        self.many(uids)?
            .into_iter()
            .filter(|(uid, _)| !uid.starts_with(RESERVED_KEY_MARKER))
            .map(|(uid, value)| Ok((uid, Record::from_value(value)?)))
            .collect()
    }

    /// Read a node record.
    pub fn node(&self, uid: &str) -> Result<Option<NodeRecord>, GraphError> {
        Ok(match self.record(uid)? {
            Some(Record::Node(node)) => Some(node),
            _ => None,
        })
    }

    /// Read a relationship record.
    pub fn relationship(&self, uid: &str) -> Result<Option<RelationshipRecord>, GraphError> {
        Ok(match self.record(uid)? {
            Some(Record::Relationship(rel)) => Some(rel),
            _ => None,
        })
    }

    /// Write a record under its own id.
    pub fn put_record(&mut self, record: &Record) -> Result<(), GraphError> {
        let value = record.to_value()?;
        self.put(record.uid(), value)
    }

    // =========================================================================
    // ID LISTS (type and sort indices)
    // =========================================================================

    /// Read an id array; absent keys read as empty.
    pub fn ids(&self, key: &str) -> Result<Vec<String>, GraphError> {
        match self.one(key)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Write an id array, deleting the key when it is empty.
    pub fn put_ids(&mut self, key: &str, ids: &[String]) -> Result<(), GraphError> {
        if ids.is_empty() {
            if self.one(key)?.is_some() {
                self.delete(key)?;
            }
            return Ok(());
        }
        self.put(key, serde_json::to_value(ids)?)
    }

    /// Append an id to an id array if missing.
    pub fn add_id(&mut self, key: &str, uid: &str) -> Result<(), GraphError> {
        let mut ids = self.ids(key)?;
        if ids.iter().any(|id| id == uid) {
            return Ok(());
        }
        ids.push(uid.to_string());
        self.put_ids(key, &ids)
    }

    /// Remove an id from an id array; an emptied array is deleted.
    pub fn remove_id(&mut self, key: &str, uid: &str) -> Result<(), GraphError> {
        let mut ids = self.ids(key)?;
        let before = ids.len();
        ids.retain(|id| id != uid);
        if ids.len() == before {
            return Ok(());
        }
        self.put_ids(key, &ids)
    }
}

// =============================================================================
// TESTS
// =============================================================================
