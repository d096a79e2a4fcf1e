//! Relationship insert, update and upsert, plus endpoint adjacency upkeep.

use super::{WriteMode, mint_id, prepare_props, queue_sort_indices, sync_unique_indices, take_id};
use crate::passport::{Action, Passport, Scope};
use crate::primitives::{RELATIONSHIP_UID_PROP, type_index_key};
use crate::request::RelationshipWrite;
use crate::types::{ErrorCode, GraphError, Props, Record, RelationshipRecord};
use std::sync::Arc;

/// Write one relationship. Placeholder ids must already be resolved.
///
/// Inserts need both endpoints. An update that moves an endpoint detaches
/// the old one first, which is checked as a delete.
pub fn write_relationship(
    passport: &mut Passport<'_>,
    mode: WriteMode,
    write: RelationshipWrite,
) -> Result<Record, GraphError> {
    let RelationshipWrite {
        relationship: type_name,
        a,
        b,
        mut props,
        options,
        ..
    } = write;

    let snapshot = Arc::clone(&passport.snapshot);
    if !snapshot.is_relationship(&type_name) {
        return Err(GraphError::reference(
            ErrorCode::UnknownRelationship,
            format!("no relationship type {type_name}"),
        )
        .with("relationship", type_name.as_str()));
    }

    let uid = take_id(&mut props, RELATIONSHIP_UID_PROP)?;
    let existing = match &uid {
        Some(uid) => passport.cache.record(uid)?,
        None => None,
    };

    let original = match (mode, existing) {
        (WriteMode::Insert, Some(_)) => {
            let uid = uid.unwrap_or_default();
            return Err(GraphError::conflict(
                ErrorCode::DuplicateId,
                format!("id {uid} is already taken"),
            )
            .with("uid", uid));
        }
        (WriteMode::Insert, None) => None,
        (_, Some(Record::Relationship(rel))) if rel.relationship == type_name => Some(rel),
        (_, _) => {
            let uid = uid.unwrap_or_default();
            return Err(GraphError::reference(
                ErrorCode::InvalidUpdateTarget,
                format!("no {type_name} relationship with id {uid:?} to update"),
            )
            .with("relationship", type_name.as_str())
            .with("uid", uid));
        }
    };

    let mut rel = match &original {
        Some(rel) => RelationshipRecord {
            a: a.unwrap_or_else(|| rel.a.clone()),
            b: b.unwrap_or_else(|| rel.b.clone()),
            ..rel.clone()
        },
        None => {
            let (Some(a), Some(b)) = (a, b) else {
                return Err(GraphError::validation(
                    ErrorCode::InvalidRequest,
                    format!("{type_name} insert needs both a and b"),
                )
                .with("relationship", type_name.as_str()));
            };
            let uid = match uid {
                Some(uid) => uid,
                None => mint_id(&mut passport.cache)?,
            };
            RelationshipRecord {
                uid,
                relationship: type_name.clone(),
                a,
                b,
                props: Props::new(),
            }
        }
    };

    let scope = Scope::Relationship(type_name.clone());
    let subject = match &original {
        Some(stored) => Record::Relationship(stored.clone()),
        None => {
            let mut candidate = rel.clone();
            candidate.props.extend(props.clone());
            Record::Relationship(candidate)
        }
    };
    passport.check_write(
        mode.action(),
        &scope,
        props.keys().map(String::as_str),
        Some(&subject),
    )?;

    let prepared = prepare_props(passport, &type_name, props, &options)?;
    let before: Props = rel.props.clone();
    rel.props.extend(prepared);

    if let Some(stored) = &original {
        for (old, new) in [(&stored.a, &rel.a), (&stored.b, &rel.b)] {
            if old != new {
                passport.check_write(
                    Action::Delete,
                    &scope,
                    std::iter::empty::<&str>(),
                    Some(&subject),
                )?;
                detach_endpoint(passport, old, &type_name, &rel.uid)?;
            }
        }
    }
    attach_endpoint(passport, &rel.a, &type_name, &rel.uid)?;
    attach_endpoint(passport, &rel.b, &type_name, &rel.uid)?;

    let record = Record::Relationship(rel);
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

    tracing::debug!(uid = %record.uid(), relationship = %type_name, ?mode, "relationship written");
    Ok(record)
}

/// Add a relationship id to an endpoint's adjacency, if the endpoint exists.
pub fn attach_endpoint(
    passport: &mut Passport<'_>,
    node_uid: &str,
    relationship: &str,
    relationship_uid: &str,
) -> Result<(), GraphError> {
    let Some(mut node) = passport.cache.node(node_uid)? else {
        tracing::debug!(node = %node_uid, relationship = %relationship, "endpoint absent, not attached");
        return Ok(());
    };
    node.attach(relationship, relationship_uid);
    passport.cache.put_record(&Record::Node(node))
}

/// Remove a relationship id from an endpoint's adjacency, if the endpoint exists.
///
/// The endpoint is staged so the required-relationship pass sees the loss.
pub fn detach_endpoint(
    passport: &mut Passport<'_>,
    node_uid: &str,
    relationship: &str,
    relationship_uid: &str,
) -> Result<(), GraphError> {
    let Some(mut node) = passport.cache.node(node_uid)? else {
        return Ok(());
    };
    if node.detach(relationship, relationship_uid) {
        passport.cache.put_record(&Record::Node(node))?;
        passport.staged.insert(node_uid.to_string());
    }
    Ok(())
}
