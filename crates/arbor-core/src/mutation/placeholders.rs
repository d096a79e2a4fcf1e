//! Two-pass placeholder resolution.
//!
//! Pass one walks every insert and mints a real id for each placeholder it
//! declares (`_:alice`). Pass two rewrites every id reference in the request
//! through the finished map. No item runs before both passes complete, so
//! an item may refer to a placeholder declared by a later item.

use super::mint_id;
use crate::passport::Passport;
use crate::primitives::{NODE_UID_PROP, RELATIONSHIP_UID_PROP, is_placeholder};
use crate::query::Selection;
use crate::request::{RelationshipWrite, RequestItem};
use crate::types::{ErrorCode, GraphError, Props};
use serde_json::Value;
use std::collections::BTreeMap;

/// Mint ids for declared placeholders, then rewrite every reference.
pub fn resolve(
    passport: &mut Passport<'_>,
    items: Vec<RequestItem>,
) -> Result<Vec<RequestItem>, GraphError> {
    for item in &items {
        let declared = match item {
            RequestItem::NodeInsert(write) => write.props.get(NODE_UID_PROP),
            RequestItem::RelationshipInsert(write) => write.props.get(RELATIONSHIP_UID_PROP),
            _ => None,
        };
        let Some(Value::String(placeholder)) = declared else {
            continue;
        };
        if !is_placeholder(placeholder) {
            continue;
        }
        if passport.new_ids.contains_key(placeholder) {
            return Err(GraphError::conflict(
                ErrorCode::DuplicatePlaceholder,
                format!("placeholder {placeholder} is declared twice"),
            )
            .with("placeholder", placeholder.as_str()));
        }
        let uid = mint_id(&mut passport.cache)?;
        passport.new_ids.insert(placeholder.clone(), uid);
    }

    let ids = &passport.new_ids;
    items.into_iter().map(|item| rewrite(item, ids)).collect()
}

fn rewrite(item: RequestItem, ids: &BTreeMap<String, String>) -> Result<RequestItem, GraphError> {
    Ok(match item {
        RequestItem::NodeInsert(mut write) => {
            rewrite_prop(&mut write.props, NODE_UID_PROP, ids)?;
            RequestItem::NodeInsert(write)
        }
        RequestItem::NodeUpdate(mut write) => {
            rewrite_prop(&mut write.props, NODE_UID_PROP, ids)?;
            RequestItem::NodeUpdate(write)
        }
        RequestItem::NodeUpsert(mut write) => {
            rewrite_prop(&mut write.props, NODE_UID_PROP, ids)?;
            RequestItem::NodeUpsert(write)
        }
        RequestItem::RelationshipInsert(write) => {
            RequestItem::RelationshipInsert(rewrite_relationship(write, ids)?)
        }
        RequestItem::RelationshipUpdate(write) => {
            RequestItem::RelationshipUpdate(rewrite_relationship(write, ids)?)
        }
        RequestItem::RelationshipUpsert(write) => {
            RequestItem::RelationshipUpsert(rewrite_relationship(write, ids)?)
        }
        RequestItem::NodeQuery {
            node,
            slot,
            mut select,
        } => {
            rewrite_selection(&mut select, ids)?;
            RequestItem::NodeQuery { node, slot, select }
        }
        RequestItem::RelationshipQuery {
            relationship,
            slot,
            mut select,
        } => {
            rewrite_selection(&mut select, ids)?;
            RequestItem::RelationshipQuery {
                relationship,
                slot,
                select,
            }
        }
        RequestItem::NodeDeleteData { uids } => RequestItem::NodeDeleteData {
            uids: rewrite_ids(uids, ids)?,
        },
        RequestItem::RelationshipDeleteData { uids } => RequestItem::RelationshipDeleteData {
            uids: rewrite_ids(uids, ids)?,
        },
        RequestItem::NodePropDeleteData { uids, props } => RequestItem::NodePropDeleteData {
            uids: rewrite_ids(uids, ids)?,
            props,
        },
        RequestItem::RelationshipPropDeleteData { uids, props } => {
            RequestItem::RelationshipPropDeleteData {
                uids: rewrite_ids(uids, ids)?,
                props,
            }
        }
        other => other,
    })
}

fn rewrite_relationship(
    mut write: RelationshipWrite,
    ids: &BTreeMap<String, String>,
) -> Result<RelationshipWrite, GraphError> {
    rewrite_prop(&mut write.props, RELATIONSHIP_UID_PROP, ids)?;
    write.a = write.a.map(|id| lookup(id, ids)).transpose()?;
    write.b = write.b.map(|id| lookup(id, ids)).transpose()?;
    Ok(write)
}

fn rewrite_selection(
    selection: &mut Selection,
    ids: &BTreeMap<String, String>,
) -> Result<(), GraphError> {
    let options = &mut selection.options;
    if let Some(uid) = options.find_by_id.take() {
        options.find_by_id = Some(lookup(uid, ids)?);
    }
    if let Some(uids) = options.filter_by_ids.take() {
        options.filter_by_ids = Some(rewrite_ids(uids, ids)?);
    }
    for nested in selection.relationships.values_mut() {
        rewrite_selection(nested, ids)?;
    }
    Ok(())
}

fn rewrite_prop(
    props: &mut Props,
    key: &str,
    ids: &BTreeMap<String, String>,
) -> Result<(), GraphError> {
    if let Some(Value::String(id)) = props.get(key)
        && is_placeholder(id)
    {
        let resolved = lookup(id.clone(), ids)?;
        props.insert(key.to_string(), Value::String(resolved));
    }
    Ok(())
}

fn rewrite_ids(uids: Vec<String>, ids: &BTreeMap<String, String>) -> Result<Vec<String>, GraphError> {
    uids.into_iter().map(|uid| lookup(uid, ids)).collect()
}

fn lookup(id: String, ids: &BTreeMap<String, String>) -> Result<String, GraphError> {
    if !is_placeholder(&id) {
        return Ok(id);
    }
    ids.get(&id).cloned().ok_or_else(|| {
        GraphError::reference(
            ErrorCode::UnknownPlaceholder,
            format!("placeholder {id} is never declared by an insert"),
        )
        .with("placeholder", id.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn items(value: Value) -> Vec<RequestItem> {
        RequestItem::parse_many(&value).expect("items")
    }

    #[test]
    fn later_declarations_resolve_earlier_references() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, None, None).expect("build");
        let resolved = resolve(
            &mut passport,
            items(json!([
                { "id": "RelationshipInsert", "relationship": "r", "a": "_:a", "b": "_:b" },
                { "id": "NodeInsert", "node": "User", "props": { "uid": "_:a" } },
                { "id": "NodeInsert", "node": "User", "props": { "uid": "_:b" } }
            ])),
        )
        .expect("resolve");

        assert_eq!(passport.new_ids["_:a"], "1");
        assert_eq!(passport.new_ids["_:b"], "2");
        assert!(matches!(
            &resolved[0],
            RequestItem::RelationshipInsert(w) if w.a.as_deref() == Some("1") && w.b.as_deref() == Some("2")
        ));
        assert!(matches!(
            &resolved[1],
            RequestItem::NodeInsert(w) if w.props["uid"] == json!("1")
        ));
    }

    #[test]
    fn duplicate_declarations_conflict() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, None, None).expect("build");
        let err = resolve(
            &mut passport,
            items(json!([
                { "id": "NodeInsert", "node": "User", "props": { "uid": "_:a" } },
                { "id": "NodeInsert", "node": "User", "props": { "uid": "_:a" } }
            ])),
        )
        .expect_err("duplicate");
        assert_eq!(err.code(), Some(ErrorCode::DuplicatePlaceholder));
    }

    #[test]
    fn undeclared_references_are_unknown() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, None, None).expect("build");
        let err = resolve(
            &mut passport,
            items(json!({ "id": "NodeDeleteData", "uids": ["_:ghost"] })),
        )
        .expect_err("unknown");
        assert_eq!(err.code(), Some(ErrorCode::UnknownPlaceholder));
    }
}
