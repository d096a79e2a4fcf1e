//! Record deletes (with cascade) and prop-only deletes.

use super::relationship::detach_endpoint;
use super::{queue_sort_indices, sync_unique_indices};
use crate::passport::{Action, Passport, Scope};
use crate::primitives::{NODE_UID_PROP, RELATIONSHIP_UID_PROP, type_index_key};
use crate::types::{ErrorCode, GraphError, NodeRecord, Props, Record, RelationshipRecord};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Bookkeeping for one delete call, shared across its cascade.
#[derive(Debug, Default)]
struct Deletion {
    /// Nodes already being deleted; never revisited.
    nodes: BTreeSet<String>,
    /// Relationships already tombstoned.
    relationships: BTreeSet<String>,
}

// =============================================================================
// NODES
// =============================================================================

/// Delete nodes, cascading across relationship props flagged `cascade`.
///
/// Non-cascading relationships are tombstoned and unlinked from the node on
/// the other end, which stays.
pub fn delete_nodes(passport: &mut Passport<'_>, uids: &[String]) -> Result<(), GraphError> {
    let mut deletion = Deletion::default();
    for uid in uids {
        let Some(node) = passport.cache.node(uid)? else {
            return Err(unknown_id(uid));
        };
        delete_node(passport, node, &mut deletion)?;
    }
    Ok(())
}

/// Delete whichever of `uids` still exist, for dropping a whole type.
pub fn purge_nodes(passport: &mut Passport<'_>, uids: &[String]) -> Result<(), GraphError> {
    let mut deletion = Deletion::default();
    for uid in uids {
        if let Some(node) = passport.cache.node(uid)? {
            delete_node(passport, node, &mut deletion)?;
        }
    }
    Ok(())
}

fn delete_node(
    passport: &mut Passport<'_>,
    node: NodeRecord,
    deletion: &mut Deletion,
) -> Result<(), GraphError> {
    if !deletion.nodes.insert(node.uid.clone()) {
        return Ok(());
    }
    let snapshot = Arc::clone(&passport.snapshot);

    let mut touched: Vec<&str> = node.props.keys().map(String::as_str).collect();
    for relationship in node.adjacency.keys() {
        touched.extend(
            snapshot
                .index
                .props_for(&node.node, relationship)
                .iter()
                .map(String::as_str),
        );
    }
    let record = Record::Node(node.clone());
    passport.check_write(
        Action::Delete,
        &Scope::Node(node.node.clone()),
        touched.iter().copied(),
        Some(&record),
    )?;

    for (relationship, rel_uids) in &node.adjacency {
        for rel_uid in rel_uids {
            if deletion.relationships.contains(rel_uid) {
                continue;
            }
            let Some(rel) = passport.cache.relationship(rel_uid)? else {
                tracing::warn!(node = %node.uid, relationship = %rel_uid, "dangling adjacency entry");
                continue;
            };
            let cascade = snapshot
                .index
                .prop_for_endpoint(&node.node, relationship, rel.a == node.uid)
                .is_some_and(|(prop, _)| snapshot.index.is_cascade(&node.node, prop));

            tombstone_relationship(passport, &rel)?;
            deletion.relationships.insert(rel.uid.clone());

            let Some(other) = rel.other_endpoint(&node.uid) else {
                continue;
            };
            if other == node.uid {
                continue;
            }
            if cascade {
                if let Some(other) = passport.cache.node(other)? {
                    tracing::debug!(from = %node.uid, to = %other.uid, "cascading delete");
                    delete_node(passport, other, deletion)?;
                }
            } else {
                detach_endpoint(passport, other, relationship, &rel.uid)?;
            }
        }
    }

    passport.cache.remove_id(&type_index_key(&node.node), &node.uid)?;
    sync_unique_indices(
        &mut passport.cache,
        &snapshot,
        &node.node,
        &node.uid,
        &node.props,
        &Props::new(),
    )?;
    queue_sort_indices(passport, &node.node, &node.props, &Props::new(), true);
    passport.cache.delete(&node.uid)?;
    passport.staged.remove(&node.uid);
    tracing::debug!(uid = %node.uid, node = %node.node, "node deleted");
    Ok(())
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// Delete relationships and unlink them from both endpoints.
pub fn delete_relationships(
    passport: &mut Passport<'_>,
    uids: &[String],
) -> Result<(), GraphError> {
    for uid in uids {
        let Some(rel) = passport.cache.relationship(uid)? else {
            return Err(unknown_id(uid));
        };
        delete_relationship(passport, &rel)?;
    }
    Ok(())
}

/// Delete whichever of `uids` still exist, for dropping a whole type.
pub fn purge_relationships(
    passport: &mut Passport<'_>,
    uids: &[String],
) -> Result<(), GraphError> {
    for uid in uids {
        if let Some(rel) = passport.cache.relationship(uid)? {
            delete_relationship(passport, &rel)?;
        }
    }
    Ok(())
}

fn delete_relationship(
    passport: &mut Passport<'_>,
    rel: &RelationshipRecord,
) -> Result<(), GraphError> {
    let record = Record::Relationship(rel.clone());
    passport.check_write(
        Action::Delete,
        &Scope::Relationship(rel.relationship.clone()),
        rel.props.keys().map(String::as_str),
        Some(&record),
    )?;
    detach_endpoint(passport, &rel.a, &rel.relationship, &rel.uid)?;
    detach_endpoint(passport, &rel.b, &rel.relationship, &rel.uid)?;
    tombstone_relationship(passport, rel)?;
    tracing::debug!(uid = %rel.uid, relationship = %rel.relationship, "relationship deleted");
    Ok(())
}

/// Drop a relationship record and its index entries. Endpoints are untouched.
fn tombstone_relationship(
    passport: &mut Passport<'_>,
    rel: &RelationshipRecord,
) -> Result<(), GraphError> {
    let snapshot = Arc::clone(&passport.snapshot);
    passport
        .cache
        .remove_id(&type_index_key(&rel.relationship), &rel.uid)?;
    sync_unique_indices(
        &mut passport.cache,
        &snapshot,
        &rel.relationship,
        &rel.uid,
        &rel.props,
        &Props::new(),
    )?;
    queue_sort_indices(passport, &rel.relationship, &rel.props, &Props::new(), true);
    passport.cache.delete(&rel.uid)?;
    passport.staged.remove(&rel.uid);
    Ok(())
}

// =============================================================================
// PROPS
// =============================================================================

/// Which kind of record a prop delete targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node,
    Relationship,
}

/// Remove value props from records.
///
/// Ids, endpoints and relationship props are reserved and cannot be removed
/// this way.
pub fn delete_props(
    passport: &mut Passport<'_>,
    target: Target,
    uids: &[String],
    props: &[String],
) -> Result<(), GraphError> {
    let snapshot = Arc::clone(&passport.snapshot);
    for uid in uids {
        let mut record = match (target, passport.cache.record(uid)?) {
            (Target::Node, Some(record @ Record::Node(_)))
            | (Target::Relationship, Some(record @ Record::Relationship(_))) => record,
            _ => return Err(unknown_id(uid)),
        };

        for prop in props {
            let reserved = match &record {
                Record::Node(node) => {
                    prop == NODE_UID_PROP
                        || snapshot.schema.relationship_prop(&node.node, prop).is_some()
                }
                Record::Relationship(_) => {
                    matches!(prop.as_str(), RELATIONSHIP_UID_PROP | "a" | "b")
                }
            };
            if reserved {
                return Err(GraphError::validation(
                    ErrorCode::ReservedProp,
                    format!("{prop} cannot be deleted as a prop"),
                )
                .with("prop", prop.as_str()));
            }
        }

        passport.check_write(
            Action::Delete,
            &Scope::of(&record),
            props.iter().map(String::as_str),
            Some(&record),
        )?;

        let before = record.props().clone();
        for prop in props {
            record.props_mut().shift_remove(prop);
        }
        if &before == record.props() {
            continue;
        }

        let type_name = record.type_name().to_string();
        passport.cache.put_record(&record)?;
        sync_unique_indices(
            &mut passport.cache,
            &snapshot,
            &type_name,
            uid,
            &before,
            record.props(),
        )?;
        queue_sort_indices(passport, &type_name, &before, record.props(), false);
        passport.staged.insert(uid.clone());
    }
    Ok(())
}

fn unknown_id(uid: &str) -> GraphError {
    GraphError::reference(ErrorCode::UnknownId, format!("no record with id {uid}")).with("uid", uid)
}
