//! # Mutation Engine
//!
//! Every write the engine performs. Each node/relationship mutation runs
//! **collect-intent -> validate -> stage**:
//!
//! - `placeholders`: two-pass `_:name` id resolution
//! - `node` / `relationship`: insert, update, upsert
//! - `delete`: record delete (with cascade), prop-only delete
//! - `schema_ops`: schema add, renames, delete-from-schema
//! - `sort_index`: batched sort-index rebuilds
//! - `required`: the end-of-request required-field pass
//!
//! Writes are issued to the store as they happen. There is no rollback:
//! a failure after some writes leaves those writes in place.

pub mod delete;
pub mod node;
pub mod placeholders;
pub mod relationship;
pub mod required;
pub mod schema_ops;
pub mod sort_index;

use crate::cache::Cache;
use crate::passport::{Action, Passport};
use crate::primitives::{DELIMITER, NEXT_ID_KEY, RESERVED_KEY_MARKER, unique_index_key};
use crate::request::WriteOptions;
use crate::schema::{DataType, SchemaSnapshot};
use crate::types::{ErrorCode, GraphError, Props};
use serde_json::Value;

/// Which write a node/relationship mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
    Upsert,
}

impl WriteMode {
    /// The permission action this write is checked against.
    #[must_use]
    pub const fn action(self) -> Action {
        match self {
            Self::Insert => Action::Insert,
            Self::Update => Action::Update,
            Self::Upsert => Action::Upsert,
        }
    }
}

// =============================================================================
// IDS
// =============================================================================

/// Mint the next free id from the persisted counter.
pub fn mint_id(cache: &mut Cache<'_>) -> Result<String, GraphError> {
    let mut next = cache
        .one(NEXT_ID_KEY)?
        .and_then(|v| v.as_u64())
        .unwrap_or(1);
    loop {
        let candidate = next.to_string();
        next += 1;
        if cache.one(&candidate)?.is_none() {
            cache.put(NEXT_ID_KEY, Value::from(next))?;
            return Ok(candidate);
        }
    }
}

// =============================================================================
// PROP VALIDATION
// =============================================================================

/// Validate incoming value props against a type and sign `hash` props.
///
/// Every prop must be declared as a value prop of `type_name` and match its
/// data type. Hash plaintexts are replaced by the signer's output.
pub fn prepare_props(
    passport: &Passport<'_>,
    type_name: &str,
    props: Props,
    options: &WriteOptions,
) -> Result<Props, GraphError> {
    let mut prepared = Props::new();
    for (name, value) in props {
        let Some(def) = passport.schema().value_prop(type_name, &name) else {
            return Err(GraphError::reference(
                ErrorCode::UnknownProp,
                format!("{type_name} has no value prop {name}"),
            )
            .with("type", type_name)
            .with("prop", name.as_str()));
        };
        if !def.data_type.accepts(&value) {
            return Err(GraphError::validation(
                ErrorCode::InvalidPropType,
                format!(
                    "{type_name}.{name} expects {}, got {value}",
                    def.data_type.as_str()
                ),
            )
            .with("type", type_name)
            .with("prop", name.as_str()));
        }
        let value = match (def.data_type, &value) {
            (DataType::Hash, Value::String(plaintext)) => {
                Value::String(sign(passport, options, plaintext)?)
            }
            _ => value,
        };
        prepared.insert(name, value);
    }
    Ok(prepared)
}

fn sign(
    passport: &Passport<'_>,
    options: &WriteOptions,
    plaintext: &str,
) -> Result<String, GraphError> {
    let signer = passport.signer.as_ref().ok_or_else(|| {
        GraphError::validation(ErrorCode::MissingSigner, "hash props need a signer")
    })?;
    let key = options.private_key.as_deref().ok_or_else(|| {
        GraphError::validation(
            ErrorCode::MissingPrivateKey,
            "hash props need options.privateKey",
        )
    })?;
    signer.sign(key, plaintext)
}

// =============================================================================
// INDEX SIDE EFFECTS
// =============================================================================

/// Keep unique indices in step with a record's props.
///
/// Last write wins: a new value simply overwrites whatever id held the key.
/// An old key is only removed while it still points at this record.
pub fn sync_unique_indices(
    cache: &mut Cache<'_>,
    snapshot: &SchemaSnapshot,
    type_name: &str,
    uid: &str,
    before: &Props,
    after: &Props,
) -> Result<(), GraphError> {
    for (prop, def) in snapshot.schema.value_props(type_name) {
        if !def.unique_index {
            continue;
        }
        let (old, new) = (before.get(prop), after.get(prop));
        if old == new {
            continue;
        }
        if let Some(old) = old {
            let key = unique_index_key(type_name, prop, old);
            if cache.one(&key)?.as_ref().and_then(Value::as_str) == Some(uid) {
                cache.delete(&key)?;
            }
        }
        if let Some(new) = new {
            cache.put(&unique_index_key(type_name, prop, new), Value::from(uid))?;
        }
    }
    Ok(())
}

/// Queue a sort-index rebuild for every sort-indexed prop whose value changed.
///
/// `membership_changed` queues every sort index of the type, for inserts
/// and deletes.
pub fn queue_sort_indices(
    passport: &mut Passport<'_>,
    type_name: &str,
    before: &Props,
    after: &Props,
    membership_changed: bool,
) {
    let snapshot = std::sync::Arc::clone(&passport.snapshot);
    for (prop, def) in snapshot.schema.value_props(type_name) {
        if def.sort_index && (membership_changed || before.get(prop) != after.get(prop)) {
            passport
                .sort_pending
                .insert((type_name.to_string(), prop.clone()));
        }
    }
}

/// Read the `uid`/`_uid` a write carries.
///
/// Caller-chosen ids must not be empty, start with the reserved-key marker
/// or contain the key delimiter.
pub fn take_id(props: &mut Props, key: &str) -> Result<Option<String>, GraphError> {
    match props.remove(key) {
        None => Ok(None),
        Some(Value::String(id)) => {
            if id.is_empty() || id.starts_with(RESERVED_KEY_MARKER) || id.contains(DELIMITER) {
                return Err(GraphError::validation(
                    ErrorCode::InvalidRequest,
                    format!("{key} {id:?} collides with the reserved key layout"),
                )
                .with(key, id));
            }
            Ok(Some(id))
        }
        Some(other) => Err(GraphError::validation(
            ErrorCode::InvalidRequest,
            format!("{key} must be a string, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn minted_ids_skip_taken_keys() {
        let mut store = MemoryStore::new();
        let mut cache = Cache::new(&mut store);
        cache.put("1", Value::from("taken")).expect("put");
        assert_eq!(mint_id(&mut cache).expect("mint"), "2");
        assert_eq!(mint_id(&mut cache).expect("mint"), "3");
        assert_eq!(cache.one(NEXT_ID_KEY).expect("one"), Some(Value::from(4)));
    }

    #[test]
    fn reserved_looking_ids_are_refused() {
        for id in ["$schema", "$index___User", "a___b", ""] {
            let mut props = Props::new();
            props.insert("uid".into(), Value::from(id));
            let err = take_id(&mut props, "uid").expect_err(id);
            assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
        }
        let mut props = Props::new();
        props.insert("uid".into(), Value::from("42"));
        assert_eq!(take_id(&mut props, "uid").expect("plain id"), Some("42".into()));
    }

    #[test]
    fn ids_must_be_strings() {
        let mut props = Props::new();
        props.insert("uid".into(), Value::from(7));
        assert!(take_id(&mut props, "uid").is_err());
        assert_eq!(take_id(&mut props, "uid").expect("absent"), None);
    }
}
