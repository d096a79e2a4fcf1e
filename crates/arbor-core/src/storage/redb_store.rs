//! # redb-backed Key-Value Store
//!
//! A disk-backed [`KvStore`] using the redb embedded database.
//!
//! - One table, `kv: &str -> &[u8]`, values are JSON bytes
//! - Every write call is its own ACID write transaction
//! - Crash safety from redb's copy-on-write B-trees
//!
//! The engine issues writes eagerly, one call at a time, so there is no
//! transaction spanning a whole request.

use super::{KvStore, ListOptions};
use crate::types::GraphError;
use redb::{
    AccessGuard, Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, StorageError,
    TableDefinition,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Table for every key: key string -> JSON bytes
const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// A disk-backed key-value store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(GraphError::storage)?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db.begin_write().map_err(GraphError::storage)?;
            let _ = write_txn.open_table(KV).map_err(GraphError::storage)?;
            write_txn.commit().map_err(GraphError::storage)?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self { db })
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<u64, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::storage)?;
        let table = read_txn.open_table(KV).map_err(GraphError::storage)?;
        table.len().map_err(GraphError::storage)
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> Result<bool, GraphError> {
        Ok(self.len()? == 0)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), GraphError> {
        self.db.compact().map_err(GraphError::storage)?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Value, GraphError> {
    Ok(serde_json::from_slice(bytes)?)
}

type Entry<'a> =
    Result<(AccessGuard<'a, &'static str>, AccessGuard<'a, &'static [u8]>), StorageError>;

/// Drain a table range, keeping prefix matches up to the limit.
fn collect_entries<'a>(
    range: impl Iterator<Item = Entry<'a>>,
    options: &ListOptions,
) -> Result<Vec<(String, Value)>, GraphError> {
    let limit = options.limit.unwrap_or(usize::MAX);
    let mut entries = Vec::new();
    for entry in range {
        if entries.len() >= limit {
            break;
        }
        let (key, value) = entry.map_err(GraphError::storage)?;
        if options.matches_prefix(key.value()) {
            entries.push((key.value().to_string(), decode(value.value())?));
        }
    }
    Ok(entries)
}

// =============================================================================
// KVSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Value>, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::storage)?;
        let table = read_txn.open_table(KV).map_err(GraphError::storage)?;

        match table.get(key).map_err(GraphError::storage)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Value>, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::storage)?;
        let table = read_txn.open_table(KV).map_err(GraphError::storage)?;

        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(data) = table.get(key.as_str()).map_err(GraphError::storage)? {
                found.insert(key.clone(), decode(data.value())?);
            }
        }
        Ok(found)
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), GraphError> {
        let bytes = serde_json::to_vec(&value)?;
        let write_txn = self.db.begin_write().map_err(GraphError::storage)?;
        {
            let mut table = write_txn.open_table(KV).map_err(GraphError::storage)?;
            table
                .insert(key, bytes.as_slice())
                .map_err(GraphError::storage)?;
        }
        write_txn.commit().map_err(GraphError::storage)?;
        Ok(())
    }

    fn put_many(&mut self, entries: BTreeMap<String, Value>) -> Result<(), GraphError> {
        if entries.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(GraphError::storage)?;
        {
            let mut table = write_txn.open_table(KV).map_err(GraphError::storage)?;
            for (key, value) in &entries {
                let bytes = serde_json::to_vec(value)?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(GraphError::storage)?;
            }
        }
        write_txn.commit().map_err(GraphError::storage)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, GraphError> {
        let write_txn = self.db.begin_write().map_err(GraphError::storage)?;
        let existed = {
            let mut table = write_txn.open_table(KV).map_err(GraphError::storage)?;
            table.remove(key).map_err(GraphError::storage)?.is_some()
        };
        write_txn.commit().map_err(GraphError::storage)?;
        Ok(existed)
    }

    fn delete_many(&mut self, keys: &[String]) -> Result<usize, GraphError> {
        let write_txn = self.db.begin_write().map_err(GraphError::storage)?;
        let mut removed = 0;
        {
            let mut table = write_txn.open_table(KV).map_err(GraphError::storage)?;
            for key in keys {
                if table
                    .remove(key.as_str())
                    .map_err(GraphError::storage)?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        write_txn.commit().map_err(GraphError::storage)?;
        Ok(removed)
    }

    fn list(&self, options: &ListOptions) -> Result<Vec<(String, Value)>, GraphError> {
        let Some(bounds) = options.bounds() else {
            return Ok(Vec::new());
        };
        let read_txn = self.db.begin_read().map_err(GraphError::storage)?;
        let table = read_txn.open_table(KV).map_err(GraphError::storage)?;
        let range = table.range::<&str>(bounds).map_err(GraphError::storage)?;

        if options.reverse {
            collect_entries(range.rev(), options)
        } else {
            collect_entries(range, options)
        }
    }

    fn delete_all(&mut self) -> Result<(), GraphError> {
        let write_txn = self.db.begin_write().map_err(GraphError::storage)?;
        write_txn.delete_table(KV).map_err(GraphError::storage)?;
        let _ = write_txn.open_table(KV).map_err(GraphError::storage)?;
        write_txn.commit().map_err(GraphError::storage)?;
        tracing::info!("redb store wiped");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        store.put("1", json!({"kind": "node"})).expect("put");
        assert_eq!(store.get("1").expect("get"), Some(json!({"kind": "node"})));
        assert!(store.delete("1").expect("delete"));
        assert!(!store.delete("1").expect("delete"));
        assert_eq!(store.get("1").expect("get"), None);
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&path).expect("open db");
            store.put("$schema", json!({"nodes": {}})).expect("put");
        }

        {
            let store = RedbStore::open(&path).expect("reopen db");
            assert_eq!(store.len().expect("len"), 1);
            assert!(store.get("$schema").expect("get").is_some());
        }
    }

    #[test]
    fn list_honours_prefix_reverse_and_limit() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let mut batch = BTreeMap::new();
        for key in ["$index___User", "$index___Post", "1", "2", "3"] {
            batch.insert(key.to_string(), json!(key));
        }
        store.put_many(batch).expect("put_many");

        let indices = store.list(&ListOptions::prefix("$index___")).expect("list");
        let keys: Vec<_> = indices.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["$index___Post", "$index___User"]);

        let options = ListOptions {
            reverse: true,
            limit: Some(2),
            ..ListOptions::default()
        };
        let tail = store.list(&options).expect("list");
        let keys: Vec<_> = tail.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["3", "2"]);
    }

    #[test]
    fn delete_all_empties_the_table() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store.put("a", json!(1)).expect("put");
        store.put("b", json!(2)).expect("put");
        assert_eq!(
            store
                .delete_many(&["a".to_string(), "zz".to_string()])
                .expect("delete_many"),
            1
        );
        store.delete_all().expect("delete_all");
        assert!(store.is_empty().expect("is_empty"));
    }
}
