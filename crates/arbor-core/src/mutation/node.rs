//! Node insert, update and upsert.

use super::{WriteMode, mint_id, prepare_props, queue_sort_indices, sync_unique_indices, take_id};
use crate::passport::{Passport, Scope};
use crate::primitives::{NODE_UID_PROP, type_index_key};
use crate::request::NodeWrite;
use crate::types::{ErrorCode, GraphError, NodeRecord, Props, Record};
use std::sync::Arc;

/// Write one node. Placeholder ids must already be resolved.
///
/// Insert rejects an id that is already taken. Update and upsert require an
/// existing node of the same type and merge the new props onto it.
pub fn write_node(
    passport: &mut Passport<'_>,
    mode: WriteMode,
    write: NodeWrite,
) -> Result<Record, GraphError> {
    let NodeWrite {
        node: type_name,
        mut props,
        options,
        ..
    } = write;

    let snapshot = Arc::clone(&passport.snapshot);
    if !snapshot.is_node(&type_name) {
        return Err(GraphError::reference(
            ErrorCode::UnknownNode,
            format!("no node type {type_name}"),
        )
        .with("node", type_name.as_str()));
    }

    let uid = take_id(&mut props, NODE_UID_PROP)?;
    let existing = match &uid {
        Some(uid) => passport.cache.record(uid)?,
        None => None,
    };

    let mut node = match (mode, existing) {
        (WriteMode::Insert, Some(_)) => {
            let uid = uid.unwrap_or_default();
            return Err(GraphError::conflict(
                ErrorCode::DuplicateId,
                format!("id {uid} is already taken"),
            )
            .with("uid", uid));
        }
        (WriteMode::Insert, None) => {
            let uid = match uid {
                Some(uid) => uid,
                None => mint_id(&mut passport.cache)?,
            };
            NodeRecord::new(uid, type_name.as_str())
        }
        (_, Some(Record::Node(node))) if node.node == type_name => node,
        (_, _) => {
            let uid = uid.unwrap_or_default();
            return Err(GraphError::reference(
                ErrorCode::InvalidUpdateTarget,
                format!("no {type_name} node with id {uid:?} to update"),
            )
            .with("node", type_name.as_str())
            .with("uid", uid));
        }
    };

    // Inserts are owned-checked against the record being created, updates
    // against the stored one.
    let mut subject = node.clone();
    if mode == WriteMode::Insert {
        subject.props.extend(props.clone());
    }
    passport.check_write(
        mode.action(),
        &Scope::Node(type_name.clone()),
        props.keys().map(String::as_str),
        Some(&Record::Node(subject)),
    )?;

    let prepared = prepare_props(passport, &type_name, props, &options)?;
    let before: Props = node.props.clone();
    node.props.extend(prepared);

    let record = Record::Node(node);
    passport.cache.put_record(&record)?;
    if mode == WriteMode::Insert {
        passport
            .cache
            .add_id(&type_index_key(&type_name), record.uid())?;
    }
    sync_unique_indices(
        &mut passport.cache,
        &snapshot,
        &type_name,
        record.uid(),
        &before,
        record.props(),
    )?;
    queue_sort_indices(
        passport,
        &type_name,
        &before,
        record.props(),
        mode == WriteMode::Insert,
    );
    passport.staged.insert(record.uid().to_string());

    tracing::debug!(uid = %record.uid(), node = %type_name, ?mode, "node written");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::primitives::unique_index_key;
    use crate::request::WriteOptions;
    use crate::schema::{Schema, SchemaSnapshot};
    use crate::storage::MemoryStore;
    use serde_json::{Value, json};

    fn snapshot() -> Arc<SchemaSnapshot> {
        let schema = Schema::from_value(json!({ "nodes": { "User": {
            "email": { "is": "prop", "dataType": "string", "uniqueIndex": true },
            "age": { "is": "prop", "dataType": "number", "sortIndex": true }
        }}}))
        .expect("schema");
        Arc::new(SchemaSnapshot::new(schema).expect("valid"))
    }

    fn write(props: Value) -> NodeWrite {
        NodeWrite {
            node: "User".into(),
            props: serde_json::from_value(props).expect("props"),
            options: WriteOptions::default(),
            slot: None,
        }
    }

    #[test]
    fn insert_indexes_and_stages_the_node() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot()), None).expect("build");

        let record = write_node(
            &mut passport,
            WriteMode::Insert,
            write(json!({ "uid": "7", "email": "a@b.c", "age": 30 })),
        )
        .expect("insert");

        assert_eq!(record.uid(), "7");
        assert_eq!(passport.cache.ids("$index___User").expect("ids"), ["7"]);
        assert_eq!(
            passport
                .cache
                .one(&unique_index_key("User", "email", &json!("a@b.c")))
                .expect("one"),
            Some(json!("7"))
        );
        assert!(passport.staged.contains("7"));
        assert!(
            passport
                .sort_pending
                .contains(&("User".to_string(), "age".to_string()))
        );
    }

    #[test]
    fn update_merges_and_moves_unique_keys() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot()), None).expect("build");
        write_node(
            &mut passport,
            WriteMode::Insert,
            write(json!({ "uid": "7", "email": "old@x", "age": 1 })),
        )
        .expect("insert");

        let record = write_node(
            &mut passport,
            WriteMode::Update,
            write(json!({ "uid": "7", "email": "new@x" })),
        )
        .expect("update");

        assert_eq!(record.props()["age"], json!(1));
        assert_eq!(
            passport
                .cache
                .one(&unique_index_key("User", "email", &json!("old@x")))
                .expect("one"),
            None
        );
        assert_eq!(
            passport
                .cache
                .one(&unique_index_key("User", "email", &json!("new@x")))
                .expect("one"),
            Some(json!("7"))
        );
    }

    #[test]
    fn updates_need_an_existing_target() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot()), None).expect("build");
        let err = write_node(&mut passport, WriteMode::Upsert, write(json!({ "uid": "404" })))
            .expect_err("missing");
        assert_eq!(err.code(), Some(ErrorCode::InvalidUpdateTarget));
    }

    #[test]
    fn props_are_type_checked() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot()), None).expect("build");
        let err = write_node(&mut passport, WriteMode::Insert, write(json!({ "age": "old" })))
            .expect_err("wrong type");
        assert_eq!(err.code(), Some(ErrorCode::InvalidPropType));

        let err = write_node(&mut passport, WriteMode::Insert, write(json!({ "shoe": 9 })))
            .expect_err("unknown prop");
        assert_eq!(err.code(), Some(ErrorCode::UnknownProp));
    }

    #[test]
    fn hash_props_need_a_signer() {
        let schema = Schema::from_value(json!({ "nodes": { "User": {
            "secret": { "is": "prop", "dataType": "hash" }
        }}}))
        .expect("schema");
        let snapshot = Arc::new(SchemaSnapshot::new(schema).expect("valid"));
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot), None).expect("build");
        let err = write_node(&mut passport, WriteMode::Insert, write(json!({ "secret": "pw" })))
            .expect_err("no signer");
        assert_eq!(err.code(), Some(ErrorCode::MissingSigner));
    }
}
