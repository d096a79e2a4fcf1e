//! # Schema Operations
//!
//! Schema add (merge), the four rename operations and the four
//! delete-from-schema operations.
//!
//! A rename rewrites every stored record of the affected type or prop, moves
//! the matching index keys and then swaps in the renamed schema. A drop
//! deletes the data first (through the regular delete paths, so permissions
//! and adjacency upkeep apply) and then removes the definitions.

use super::delete::{Target, delete_props, purge_nodes, purge_relationships};
use crate::cache::Cache;
use crate::passport::{Action, Passport};
use crate::primitives::{
    sort_index_key, type_index_key, unique_index_prefix, unique_index_type_prefix,
};
use crate::request::Rename;
use crate::schema::{NodeType, PropDef, Schema, validate};
use crate::storage::ListOptions;
use crate::types::{ErrorCode, GraphError, Record};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ADD
// =============================================================================

/// Merge a (possibly partial) schema document into the current schema.
pub fn add_schema(passport: &mut Passport<'_>, document: Value) -> Result<(), GraphError> {
    passport.check_schema(Action::Insert)?;
    let incoming = Schema::from_value(document)?;
    let mut merged = passport.schema().clone();
    merged.merge(incoming);
    passport.replace_schema(merged)
}

// =============================================================================
// RENAMES
// =============================================================================

/// Rename node types.
pub fn rename_nodes(passport: &mut Passport<'_>, renames: &[Rename]) -> Result<(), GraphError> {
    passport.check_schema(Action::Update)?;
    for Rename { now_name, new_name } in renames {
        let mut schema = passport.schema().clone();
        let Some(props) = schema.nodes.remove(now_name) else {
            return Err(unknown_node(now_name));
        };
        ensure_free_type_name(&schema, new_name)?;
        let sorted = sort_props(&props);
        schema.nodes.insert(new_name.clone(), props);
        for props in schema.nodes.values_mut() {
            for def in props.values_mut() {
                if let PropDef::RelationshipProp(rel) = def
                    && rel.node == *now_name
                {
                    rel.node.clone_from(new_name);
                }
            }
        }
        validate(&schema)?;

        let cache = &mut passport.cache;
        for (_, record) in members(cache, now_name)? {
            if let Record::Node(mut node) = record {
                node.node.clone_from(new_name);
                cache.put_record(&Record::Node(node))?;
            }
        }
        move_type_keys(cache, now_name, new_name, &sorted)?;
        rename_pending(passport, now_name, new_name, None);
        passport.replace_schema(schema)?;
        tracing::info!(from = %now_name, to = %new_name, "node type renamed");
    }
    Ok(())
}

/// Rename props of one node type.
pub fn rename_node_props(
    passport: &mut Passport<'_>,
    node: &str,
    renames: &[Rename],
) -> Result<(), GraphError> {
    passport.check_schema(Action::Update)?;
    for Rename { now_name, new_name } in renames {
        let mut schema = passport.schema().clone();
        let props = schema.nodes.get_mut(node).ok_or_else(|| unknown_node(node))?;
        let def = props
            .remove(now_name)
            .ok_or_else(|| unknown_prop(node, now_name))?;
        if props.contains_key(new_name) {
            return Err(taken(new_name));
        }
        props.insert(new_name.clone(), def.clone());
        validate(&schema)?;

        // Relationship props live only in the schema; adjacency is keyed by
        // relationship name.
        if let PropDef::Prop(value) = def {
            rename_record_prop(&mut passport.cache, node, now_name, new_name)?;
            if value.unique_index {
                move_prefix(
                    &mut passport.cache,
                    &unique_index_prefix(node, now_name),
                    &unique_index_prefix(node, new_name),
                )?;
            }
            if value.sort_index {
                move_key(
                    &mut passport.cache,
                    &sort_index_key(node, now_name),
                    &sort_index_key(node, new_name),
                )?;
            }
        }
        rename_pending(passport, node, node, Some((now_name, new_name)));
        passport.replace_schema(schema)?;
        tracing::info!(node = %node, from = %now_name, to = %new_name, "node prop renamed");
    }
    Ok(())
}

/// Rename relationship types.
pub fn rename_relationships(
    passport: &mut Passport<'_>,
    renames: &[Rename],
) -> Result<(), GraphError> {
    passport.check_schema(Action::Update)?;
    for Rename { now_name, new_name } in renames {
        let mut schema = passport.schema().clone();
        let Some(relationship) = schema.relationships.remove(now_name) else {
            return Err(unknown_relationship(now_name));
        };
        ensure_free_type_name(&schema, new_name)?;
        let sorted: Vec<String> = relationship
            .props
            .iter()
            .filter(|(_, def)| def.sort_index)
            .map(|(prop, _)| prop.clone())
            .collect();
        schema.relationships.insert(new_name.clone(), relationship);
        for props in schema.nodes.values_mut() {
            for def in props.values_mut() {
                if let PropDef::RelationshipProp(rel) = def
                    && rel.relationship == *now_name
                {
                    rel.relationship.clone_from(new_name);
                }
            }
        }
        validate(&schema)?;

        let cache = &mut passport.cache;
        for (_, record) in members(cache, now_name)? {
            let Record::Relationship(mut rel) = record else {
                continue;
            };
            rel.relationship.clone_from(new_name);
            for endpoint in [&rel.a, &rel.b] {
                let Some(mut node) = cache.node(endpoint)? else {
                    continue;
                };
                if let Some(ids) = node.adjacency.remove(now_name) {
                    node.adjacency.entry(new_name.clone()).or_default().extend(ids);
                    cache.put_record(&Record::Node(node))?;
                }
            }
            cache.put_record(&Record::Relationship(rel))?;
        }
        move_type_keys(cache, now_name, new_name, &sorted)?;
        rename_pending(passport, now_name, new_name, None);
        passport.replace_schema(schema)?;
        tracing::info!(from = %now_name, to = %new_name, "relationship type renamed");
    }
    Ok(())
}

/// Rename props of one relationship type.
pub fn rename_relationship_props(
    passport: &mut Passport<'_>,
    relationship: &str,
    renames: &[Rename],
) -> Result<(), GraphError> {
    passport.check_schema(Action::Update)?;
    for Rename { now_name, new_name } in renames {
        let mut schema = passport.schema().clone();
        let props = &mut schema
            .relationships
            .get_mut(relationship)
            .ok_or_else(|| unknown_relationship(relationship))?
            .props;
        let def = props
            .remove(now_name)
            .ok_or_else(|| unknown_prop(relationship, now_name))?;
        if props.contains_key(new_name) {
            return Err(taken(new_name));
        }
        props.insert(new_name.clone(), def.clone());
        validate(&schema)?;

        rename_record_prop(&mut passport.cache, relationship, now_name, new_name)?;
        if def.unique_index {
            move_prefix(
                &mut passport.cache,
                &unique_index_prefix(relationship, now_name),
                &unique_index_prefix(relationship, new_name),
            )?;
        }
        if def.sort_index {
            move_key(
                &mut passport.cache,
                &sort_index_key(relationship, now_name),
                &sort_index_key(relationship, new_name),
            )?;
        }
        rename_pending(passport, relationship, relationship, Some((now_name, new_name)));
        passport.replace_schema(schema)?;
        tracing::info!(
            relationship = %relationship,
            from = %now_name,
            to = %new_name,
            "relationship prop renamed"
        );
    }
    Ok(())
}

// =============================================================================
// DELETE FROM SCHEMA
// =============================================================================

/// Delete every record of the node types, then drop the types along with
/// every relationship type they take part in.
pub fn drop_nodes(passport: &mut Passport<'_>, nodes: &[String]) -> Result<(), GraphError> {
    passport.check_schema(Action::Delete)?;
    for name in nodes {
        let Some(props) = passport.schema().nodes.get(name) else {
            return Err(unknown_node(name));
        };
        let relationships: BTreeSet<String> = props
            .values()
            .filter_map(|def| match def {
                PropDef::RelationshipProp(rel) => Some(rel.relationship.clone()),
                PropDef::Prop(_) => None,
            })
            .collect();
        let sorted = sort_props(props);

        let members = passport.cache.ids(&type_index_key(name))?;
        purge_nodes(passport, &members)?;
        drop_type_keys(&mut passport.cache, name, &sorted)?;

        let relationships: Vec<String> = relationships.into_iter().collect();
        drop_relationship_data(passport, &relationships)?;

        let mut schema = passport.schema().clone();
        schema.nodes.remove(name);
        for relationship in &relationships {
            forget_relationship(&mut schema, relationship);
        }
        passport.sort_pending.retain(|(type_name, _)| type_name != name);
        passport.replace_schema(schema)?;
        tracing::info!(node = %name, "node type dropped");
    }
    Ok(())
}

/// Delete every record of the relationship types, then drop the types and
/// every node prop that points at them.
pub fn drop_relationships(
    passport: &mut Passport<'_>,
    relationships: &[String],
) -> Result<(), GraphError> {
    passport.check_schema(Action::Delete)?;
    for name in relationships {
        if !passport.snapshot.is_relationship(name) {
            return Err(unknown_relationship(name));
        }
    }
    drop_relationship_data(passport, relationships)?;

    let mut schema = passport.schema().clone();
    for name in relationships {
        forget_relationship(&mut schema, name);
    }
    passport.replace_schema(schema)?;
    tracing::info!(relationships = relationships.len(), "relationship types dropped");
    Ok(())
}

/// Strip value props from every node of a type and drop their definitions.
pub fn drop_node_props(
    passport: &mut Passport<'_>,
    node: &str,
    props: &[String],
) -> Result<(), GraphError> {
    passport.check_schema(Action::Delete)?;
    let Some(defs) = passport.schema().nodes.get(node) else {
        return Err(unknown_node(node));
    };
    for prop in props {
        match defs.get(prop) {
            None => return Err(unknown_prop(node, prop)),
            Some(PropDef::RelationshipProp(_)) => {
                return Err(GraphError::validation(
                    ErrorCode::ReservedProp,
                    format!(
                        "{node}.{prop} is a relationship prop; drop its relationship instead"
                    ),
                )
                .with("node", node)
                .with("prop", prop.as_str()));
            }
            Some(PropDef::Prop(_)) => {}
        }
    }
    strip_props(passport, Target::Node, node, props)?;

    let mut schema = passport.schema().clone();
    if let Some(defs) = schema.nodes.get_mut(node) {
        for prop in props {
            defs.remove(prop);
        }
    }
    passport.replace_schema(schema)?;
    tracing::info!(node = %node, props = props.len(), "node props dropped");
    Ok(())
}

/// Strip props from every relationship of a type and drop their definitions.
pub fn drop_relationship_props(
    passport: &mut Passport<'_>,
    relationship: &str,
    props: &[String],
) -> Result<(), GraphError> {
    passport.check_schema(Action::Delete)?;
    let Some(defs) = passport.schema().relationships.get(relationship) else {
        return Err(unknown_relationship(relationship));
    };
    if let Some(prop) = props.iter().find(|prop| !defs.props.contains_key(*prop)) {
        return Err(unknown_prop(relationship, prop));
    }
    strip_props(passport, Target::Relationship, relationship, props)?;

    let mut schema = passport.schema().clone();
    if let Some(defs) = schema.relationships.get_mut(relationship) {
        for prop in props {
            defs.props.remove(prop);
        }
    }
    passport.replace_schema(schema)?;
    tracing::info!(relationship = %relationship, props = props.len(), "relationship props dropped");
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn drop_relationship_data(
    passport: &mut Passport<'_>,
    relationships: &[String],
) -> Result<(), GraphError> {
    for name in relationships {
        let sorted: Vec<String> = passport
            .schema()
            .relationships
            .get(name)
            .map(|rel| {
                rel.props
                    .iter()
                    .filter(|(_, def)| def.sort_index)
                    .map(|(prop, _)| prop.clone())
                    .collect()
            })
            .unwrap_or_default();
        let members = passport.cache.ids(&type_index_key(name))?;
        purge_relationships(passport, &members)?;
        drop_type_keys(&mut passport.cache, name, &sorted)?;
        passport.sort_pending.retain(|(type_name, _)| type_name != name);
    }
    Ok(())
}

/// Remove a relationship type and every node prop referencing it.
fn forget_relationship(schema: &mut Schema, relationship: &str) {
    schema.relationships.remove(relationship);
    for props in schema.nodes.values_mut() {
        props.retain(|_, def| {
            !matches!(def, PropDef::RelationshipProp(rel) if rel.relationship == relationship)
        });
    }
}

fn strip_props(
    passport: &mut Passport<'_>,
    target: Target,
    type_name: &str,
    props: &[String],
) -> Result<(), GraphError> {
    let members: Vec<String> = passport
        .cache
        .records(&passport.cache.ids(&type_index_key(type_name))?)?
        .into_keys()
        .collect();
    delete_props(passport, target, &members, props)?;
    for prop in props {
        drop_prefix(&mut passport.cache, &unique_index_prefix(type_name, prop))?;
        let key = sort_index_key(type_name, prop);
        if passport.cache.one(&key)?.is_some() {
            passport.cache.delete(&key)?;
        }
        passport
            .sort_pending
            .remove(&(type_name.to_string(), prop.clone()));
    }
    Ok(())
}

/// Every stored record listed in a type index.
fn members(
    cache: &Cache<'_>,
    type_name: &str,
) -> Result<BTreeMap<String, Record>, GraphError> {
    cache.records(&cache.ids(&type_index_key(type_name))?)
}

fn rename_record_prop(
    cache: &mut Cache<'_>,
    type_name: &str,
    from: &str,
    to: &str,
) -> Result<(), GraphError> {
    for (_, mut record) in members(cache, type_name)? {
        if let Some(value) = record.props_mut().shift_remove(from) {
            record.props_mut().insert(to.to_string(), value);
            cache.put_record(&record)?;
        }
    }
    Ok(())
}

/// Sort-indexed value props of a node type.
fn sort_props(props: &NodeType) -> Vec<String> {
    props
        .iter()
        .filter_map(|(prop, def)| match def {
            PropDef::Prop(value) if value.sort_index => Some(prop.clone()),
            _ => None,
        })
        .collect()
}

fn move_type_keys(
    cache: &mut Cache<'_>,
    from: &str,
    to: &str,
    sorted: &[String],
) -> Result<(), GraphError> {
    move_key(cache, &type_index_key(from), &type_index_key(to))?;
    move_prefix(
        cache,
        &unique_index_type_prefix(from),
        &unique_index_type_prefix(to),
    )?;
    for prop in sorted {
        move_key(cache, &sort_index_key(from, prop), &sort_index_key(to, prop))?;
    }
    Ok(())
}

fn drop_type_keys(cache: &mut Cache<'_>, name: &str, sorted: &[String]) -> Result<(), GraphError> {
    for key in std::iter::once(type_index_key(name))
        .chain(sorted.iter().map(|prop| sort_index_key(name, prop)))
    {
        if cache.one(&key)?.is_some() {
            cache.delete(&key)?;
        }
    }
    drop_prefix(cache, &unique_index_type_prefix(name))
}

fn move_key(cache: &mut Cache<'_>, from: &str, to: &str) -> Result<(), GraphError> {
    if let Some(value) = cache.one(from)? {
        cache.delete(from)?;
        cache.put(to, value)?;
    }
    Ok(())
}

fn move_prefix(cache: &mut Cache<'_>, from: &str, to: &str) -> Result<(), GraphError> {
    for (key, value) in cache.list(&ListOptions::prefix(from))? {
        let suffix = &key[from.len()..];
        cache.delete(&key)?;
        cache.put(&format!("{to}{suffix}"), value)?;
    }
    Ok(())
}

fn drop_prefix(cache: &mut Cache<'_>, prefix: &str) -> Result<(), GraphError> {
    for (key, _) in cache.list(&ListOptions::prefix(prefix))? {
        cache.delete(&key)?;
    }
    Ok(())
}

/// Carry pending sort rebuilds across a rename.
fn rename_pending(
    passport: &mut Passport<'_>,
    from: &str,
    to: &str,
    prop: Option<(&String, &String)>,
) {
    let pending = std::mem::take(&mut passport.sort_pending);
    passport.sort_pending = pending
        .into_iter()
        .map(|(type_name, sort_prop)| {
            let type_name = if type_name == from { to.to_string() } else { type_name };
            let sort_prop = match prop {
                Some((old, new)) if type_name == to && sort_prop == *old => new.clone(),
                _ => sort_prop,
            };
            (type_name, sort_prop)
        })
        .collect();
}

fn ensure_free_type_name(schema: &Schema, name: &str) -> Result<(), GraphError> {
    if schema.nodes.contains_key(name) || schema.relationships.contains_key(name) {
        return Err(taken(name));
    }
    Ok(())
}

fn taken(name: &str) -> GraphError {
    GraphError::validation(ErrorCode::SchemaValidation, format!("{name} is already defined"))
        .with("name", name)
}

fn unknown_node(name: &str) -> GraphError {
    GraphError::reference(ErrorCode::UnknownNode, format!("no node type {name}")).with("node", name)
}

fn unknown_relationship(name: &str) -> GraphError {
    GraphError::reference(
        ErrorCode::UnknownRelationship,
        format!("no relationship type {name}"),
    )
    .with("relationship", name)
}

fn unknown_prop(type_name: &str, prop: &str) -> GraphError {
    GraphError::reference(ErrorCode::UnknownProp, format!("{type_name} has no prop {prop}"))
        .with("type", type_name)
        .with("prop", prop)
}
