//! Candidate resolution, permission filtering and dual-view shaping.

use super::filter;
use super::pipeline::{self, Shaped};
use super::types::{QueryOptions, Selection, SortHow};
use crate::mutation::sort_index;
use crate::passport::{Passport, Scope};
use crate::primitives::{
    NODE_UID_PROP, RELATIONSHIP_UID_PROP, sort_index_key, type_index_key, unique_index_key,
};
use crate::schema::{Direction, RelationshipPropDef};
use crate::types::{ErrorCode, GraphError, NodeRecord, Record, RelationshipRecord};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// What a top-level query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTarget {
    Node,
    Relationship,
}

/// One result element in both views.
#[derive(Debug, Clone)]
pub(super) struct Row {
    pub record: Record,
    /// Everything, for internal computation.
    pub original: Map<String, Value>,
    /// What the caller may see, under alias names.
    pub now: Map<String, Value>,
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Run a top-level query. Returns `(now, original)`.
pub fn run(
    passport: &mut Passport<'_>,
    target: QueryTarget,
    type_name: &str,
    selection: &Selection,
) -> Result<(Value, Value), GraphError> {
    let scope = match target {
        QueryTarget::Node if passport.snapshot.is_node(type_name) => {
            Scope::Node(type_name.to_string())
        }
        QueryTarget::Relationship if passport.snapshot.is_relationship(type_name) => {
            Scope::Relationship(type_name.to_string())
        }
        QueryTarget::Node => {
            return Err(GraphError::reference(
                ErrorCode::UnknownNode,
                format!("no node type {type_name}"),
            )
            .with("node", type_name));
        }
        QueryTarget::Relationship => {
            return Err(GraphError::reference(
                ErrorCode::UnknownRelationship,
                format!("no relationship type {type_name}"),
            )
            .with("relationship", type_name));
        }
    };

    let allow = passport.read_gate(&scope)?;
    let (ids, presorted) = candidates(passport, type_name, &selection.options)?;
    let passport: &Passport<'_> = passport;

    let mut records = passport.cache.records(&ids)?;
    let mut rows = Vec::with_capacity(ids.len());
    for uid in &ids {
        let Some(record) = records.remove(uid) else {
            continue;
        };
        let matches_target = match (&record, target) {
            (Record::Node(n), QueryTarget::Node) => n.node == type_name,
            (Record::Relationship(r), QueryTarget::Relationship) => r.relationship == type_name,
            _ => false,
        };
        if !matches_target {
            continue;
        }
        if let Some(allow) = &allow
            && !passport.owns(&record, allow)?
        {
            continue;
        }
        rows.push(shape(passport, record, selection, None)?);
    }

    tracing::debug!(type_name = %type_name, candidates = ids.len(), rows = rows.len(), "query shaped");
    finish(passport, rows, &selection.options, presorted, false)
}

/// Both views of a single record, with every readable prop selected.
pub fn view(passport: &Passport<'_>, record: Record) -> Result<(Value, Value), GraphError> {
    let row = shape(passport, record, &Selection::default(), None)?;
    Ok((Value::Object(row.now), Value::Object(row.original)))
}

// =============================================================================
// CANDIDATES
// =============================================================================

/// Candidate ids, and whether they already come in sort order.
fn candidates(
    passport: &mut Passport<'_>,
    type_name: &str,
    options: &QueryOptions,
) -> Result<(Vec<String>, bool), GraphError> {
    let restriction = restriction(passport, type_name, options)?;

    if let Some(sort) = &options.sort
        && passport
            .schema()
            .value_prop(type_name, &sort.prop)
            .is_some_and(|def| def.sort_index)
    {
        sort_index::flush_one(passport, type_name, &sort.prop)?;
        let key = sort_index_key(type_name, &sort.prop);
        let mut ordered = match passport.cache.one(&key)? {
            Some(_) => passport.cache.ids(&key)?,
            None => sort_index::rebuild(&mut passport.cache, type_name, &sort.prop)?,
        };
        if sort.how == SortHow::Dsc {
            ordered.reverse();
        }
        if let Some(allowed) = restriction {
            let allowed: BTreeSet<String> = allowed.into_iter().collect();
            ordered.retain(|uid| allowed.contains(uid));
        }
        return Ok((ordered, true));
    }

    match restriction {
        Some(ids) => Ok((ids, false)),
        None => Ok((passport.cache.ids(&type_index_key(type_name))?, false)),
    }
}

/// Ids named by the id or unique-index options, if any.
fn restriction(
    passport: &Passport<'_>,
    type_name: &str,
    options: &QueryOptions,
) -> Result<Option<Vec<String>>, GraphError> {
    if let Some(uid) = &options.find_by_id {
        return Ok(Some(vec![uid.clone()]));
    }
    if let Some(uids) = &options.filter_by_ids {
        return Ok(Some(uids.clone()));
    }
    let lookups: Vec<_> = match (&options.find_by_unique, &options.filter_by_uniques) {
        (Some(lookup), _) => vec![lookup],
        (None, Some(lookups)) => lookups.iter().collect(),
        (None, None) => return Ok(None),
    };
    let mut found = Vec::new();
    for lookup in lookups {
        let key = unique_index_key(type_name, &lookup.prop, &lookup.value);
        if let Some(Value::String(uid)) = passport.cache.one(&key)?
            && !found.contains(&uid)
        {
            found.push(uid);
        }
    }
    Ok(Some(found))
}

// =============================================================================
// SHAPING
// =============================================================================

/// Build both views of a record, recursing into selected relationships.
///
/// `via` is the relationship the record was reached through.
pub(super) fn shape(
    passport: &Passport<'_>,
    record: Record,
    selection: &Selection,
    via: Option<&RelationshipRecord>,
) -> Result<Row, GraphError> {
    let scope = Scope::of(&record);
    let mut original = Map::new();
    match &record {
        Record::Node(node) => {
            original.insert(NODE_UID_PROP.into(), Value::from(node.uid.as_str()));
        }
        Record::Relationship(rel) => {
            original.insert(RELATIONSHIP_UID_PROP.into(), Value::from(rel.uid.as_str()));
            original.insert("a".into(), Value::from(rel.a.as_str()));
            original.insert("b".into(), Value::from(rel.b.as_str()));
        }
    }
    for (prop, value) in record.props() {
        original.insert(prop.clone(), value.clone());
    }

    let mut now = Map::new();
    for (prop, value) in &original {
        if selection.props.includes(prop) && passport.can_read_prop(&scope, prop, &record)? {
            now.insert(visible_name(selection, prop), value.clone());
        }
    }

    if let Some(rel) = via {
        let rel_scope = Scope::Relationship(rel.relationship.clone());
        let rel_record = Record::Relationship(rel.clone());
        for (prop, value) in &rel.props {
            original.insert(prop.clone(), value.clone());
            let selected = selection
                .relationship_props
                .as_ref()
                .is_some_and(|props| props.includes(prop));
            if selected && passport.can_read_prop(&rel_scope, prop, &rel_record)? {
                now.insert(visible_name(selection, prop), value.clone());
            }
        }
        original.insert(RELATIONSHIP_UID_PROP.into(), Value::from(rel.uid.as_str()));
    }

    for (prop, nested) in &selection.relationships {
        let (nested_now, nested_original) = match &record {
            Record::Node(node) => traverse(passport, node, prop, nested)?,
            Record::Relationship(rel) => endpoint(passport, rel, prop, nested)?,
        };
        original.insert(prop.clone(), nested_original);
        if passport.can_read_prop(&scope, prop, &record)? {
            now.insert(visible_name(selection, prop), nested_now);
        }
    }

    Ok(Row {
        record,
        original,
        now,
    })
}

fn visible_name(selection: &Selection, prop: &str) -> String {
    selection
        .aliases
        .get(prop)
        .cloned()
        .unwrap_or_else(|| prop.to_string())
}

/// Shape the nodes reached from `node` through relationship prop `prop`.
fn traverse(
    passport: &Passport<'_>,
    node: &NodeRecord,
    prop: &str,
    selection: &Selection,
) -> Result<(Value, Value), GraphError> {
    let def = relationship_prop(passport, &node.node, prop)?;
    let singular = passport
        .schema()
        .relationships
        .get(&def.relationship)
        .is_some_and(|rel| rel.kind.is_singular(def.direction));

    let allow = passport.read_gate(&Scope::Node(def.node.clone()))?;
    let mut rows = Vec::new();
    for (rel, other) in neighbours(passport, node, def)? {
        let record = Record::Node(other);
        if let Some(allow) = &allow
            && !passport.owns(&record, allow)?
        {
            continue;
        }
        rows.push(shape(passport, record, selection, Some(&rel))?);
    }
    finish(passport, rows, &selection.options, false, singular)
}

/// Shape endpoint `a` or `b` of a relationship row.
fn endpoint(
    passport: &Passport<'_>,
    rel: &RelationshipRecord,
    prop: &str,
    selection: &Selection,
) -> Result<(Value, Value), GraphError> {
    let uid = match prop {
        "a" => &rel.a,
        "b" => &rel.b,
        _ => {
            return Err(GraphError::reference(
                ErrorCode::UnknownProp,
                format!("relationship rows only expand a or b, not {prop}"),
            )
            .with("relationship", rel.relationship.as_str())
            .with("prop", prop));
        }
    };
    let Some(node) = passport.cache.node(uid)? else {
        return Ok((Value::Null, Value::Null));
    };
    let record = Record::Node(node);
    let scope = Scope::of(&record);
    if let Some(allow) = passport.read_gate(&scope)?
        && !passport.owns(&record, &allow)?
    {
        return Ok((Value::Null, Value::Null));
    }
    let row = shape(passport, record, selection, None)?;
    Ok((Value::Object(row.now), Value::Object(row.original)))
}

/// Filter, post-process and collapse a row set.
fn finish(
    passport: &Passport<'_>,
    rows: Vec<Row>,
    options: &QueryOptions,
    presorted: bool,
    singular: bool,
) -> Result<(Value, Value), GraphError> {
    let rows = filter::apply(passport, rows, options)?;
    match pipeline::run(passport, rows, options, presorted)? {
        Shaped::Collapsed { now, original } => Ok((now, original)),
        Shaped::Rows(rows) if singular || options.collapses(rows.len()) => {
            Ok(match rows.into_iter().next() {
                Some(row) => (Value::Object(row.now), Value::Object(row.original)),
                None => (Value::Null, Value::Null),
            })
        }
        Shaped::Rows(rows) => {
            let (now, original) = rows
                .into_iter()
                .map(|row| (Value::Object(row.now), Value::Object(row.original)))
                .unzip();
            Ok((Value::Array(now), Value::Array(original)))
        }
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Look up a relationship prop of a node type.
pub(super) fn relationship_prop<'p>(
    passport: &'p Passport<'_>,
    node: &str,
    prop: &str,
) -> Result<&'p RelationshipPropDef, GraphError> {
    passport.schema().relationship_prop(node, prop).ok_or_else(|| {
        GraphError::reference(
            ErrorCode::UnknownProp,
            format!("{node} has no relationship prop {prop}"),
        )
        .with("node", node)
        .with("prop", prop)
    })
}

/// Edges of `node` through `def`, on the side its direction implies, with
/// the node on the other end.
pub(super) fn neighbours(
    passport: &Passport<'_>,
    node: &NodeRecord,
    def: &RelationshipPropDef,
) -> Result<Vec<(RelationshipRecord, NodeRecord)>, GraphError> {
    let mut found = Vec::new();
    for rel_uid in node.adjacency.get(&def.relationship).into_iter().flatten() {
        let Some(rel) = passport.cache.relationship(rel_uid)? else {
            tracing::warn!(node = %node.uid, relationship = %rel_uid, "dangling adjacency entry");
            continue;
        };
        let other = match def.direction {
            Direction::Forward if rel.a == node.uid => &rel.b,
            Direction::Reverse if rel.b == node.uid => &rel.a,
            Direction::Bidirectional => match rel.other_endpoint(&node.uid) {
                Some(other) => other,
                None => continue,
            },
            _ => continue,
        };
        if let Some(other) = passport.cache.node(other)?
            && other.node == def.node
        {
            found.push((rel, other));
        }
    }
    Ok(found)
}
