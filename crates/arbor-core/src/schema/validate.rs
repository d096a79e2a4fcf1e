//! # Schema Validator
//!
//! Pure checks over a schema document. Nothing is written; the caller gets
//! `Ok(())` or a descriptive validation error.
//!
//! A schema is valid if:
//! - every node, relationship and prop name follows the naming rules
//! - every relationship prop targets an existing node type
//! - every relationship named by a node prop exists, and every relationship
//!   type is named by at least one node prop
//! - every relationship has exactly one bidirectional prop, or exactly one
//!   forward and one reverse prop with distinct names

use super::{Direction, PropDef, Schema};
use crate::primitives::{
    DELIMITER, NODE_UID_PROP, RELATIONSHIP_PROP_MARKER, RELATIONSHIP_UID_PROP,
};
use crate::types::{ErrorCode, GraphError};
use std::collections::BTreeMap;

/// Validate a schema document.
pub fn validate(schema: &Schema) -> Result<(), GraphError> {
    check_names(schema)?;

    // relationship name -> [(node, prop, direction)]
    let mut usages: BTreeMap<&str, Vec<(&str, &str, Direction)>> = BTreeMap::new();

    for (node_name, props) in &schema.nodes {
        for (prop_name, def) in props {
            let PropDef::RelationshipProp(rel) = def else {
                continue;
            };
            if !schema.nodes.contains_key(&rel.node) {
                return Err(invalid(format!(
                    "{node_name}.{prop_name} targets unknown node type {}",
                    rel.node
                ))
                .with("node", node_name.as_str())
                .with("prop", prop_name.as_str()));
            }
            if !schema.relationships.contains_key(&rel.relationship) {
                return Err(invalid(format!(
                    "{node_name}.{prop_name} names unknown relationship {}",
                    rel.relationship
                ))
                .with("node", node_name.as_str())
                .with("relationship", rel.relationship.as_str()));
            }
            usages.entry(rel.relationship.as_str()).or_default().push((
                node_name.as_str(),
                prop_name.as_str(),
                rel.direction,
            ));
        }
    }

    for relationship in schema.relationships.keys() {
        let Some(props) = usages.get(relationship.as_str()) else {
            return Err(invalid(format!(
                "relationship {relationship} is not referenced by any node prop"
            ))
            .with("relationship", relationship.as_str()));
        };
        check_alignment(relationship, props)?;
    }

    Ok(())
}

/// Exactly one bidirectional prop, or exactly one forward + one reverse prop
/// with distinct names.
fn check_alignment(
    relationship: &str,
    props: &[(&str, &str, Direction)],
) -> Result<(), GraphError> {
    let count = |d: Direction| props.iter().filter(|(_, _, dir)| *dir == d).count();
    let (bidirectional, forward, reverse) = (
        count(Direction::Bidirectional),
        count(Direction::Forward),
        count(Direction::Reverse),
    );

    let aligned = match (bidirectional, forward, reverse) {
        (1, 0, 0) => true,
        (0, 1, 1) => {
            let name_of = |d: Direction| {
                props
                    .iter()
                    .find(|(_, _, dir)| *dir == d)
                    .map(|(_, prop, _)| *prop)
            };
            name_of(Direction::Forward) != name_of(Direction::Reverse)
        }
        _ => false,
    };

    if aligned {
        Ok(())
    } else {
        Err(GraphError::validation(
            ErrorCode::SchemaInvalidRelationshipAlignment,
            format!(
                "relationship {relationship} needs one bidirectional prop or one forward and one reverse prop with distinct names (found {bidirectional} bidirectional, {forward} forward, {reverse} reverse)"
            ),
        )
        .with("relationship", relationship))
    }
}

fn check_names(schema: &Schema) -> Result<(), GraphError> {
    for (node_name, props) in &schema.nodes {
        check_type_name(node_name)?;
        if schema.relationships.contains_key(node_name) {
            return Err(invalid(format!(
                "{node_name} is used as both a node and a relationship name"
            )));
        }
        for prop_name in props.keys() {
            check_name(prop_name)?;
            if prop_name.starts_with(RELATIONSHIP_PROP_MARKER) {
                return Err(invalid(format!(
                    "node prop {node_name}.{prop_name} must not start with {RELATIONSHIP_PROP_MARKER}"
                )));
            }
            if prop_name == NODE_UID_PROP {
                return Err(GraphError::validation(
                    ErrorCode::ReservedProp,
                    format!("{node_name}.{prop_name} is reserved"),
                ));
            }
        }
    }

    for (relationship_name, relationship) in &schema.relationships {
        check_type_name(relationship_name)?;
        for prop_name in relationship.props.keys() {
            check_name(prop_name)?;
            if !prop_name.starts_with(RELATIONSHIP_PROP_MARKER) {
                return Err(invalid(format!(
                    "relationship prop {relationship_name}.{prop_name} must start with {RELATIONSHIP_PROP_MARKER}"
                )));
            }
            if prop_name == RELATIONSHIP_UID_PROP {
                return Err(GraphError::validation(
                    ErrorCode::ReservedProp,
                    format!("{relationship_name}.{prop_name} is reserved"),
                ));
            }
        }
    }

    Ok(())
}

fn check_type_name(name: &str) -> Result<(), GraphError> {
    check_name(name)?;
    if name.starts_with(RELATIONSHIP_PROP_MARKER) {
        return Err(invalid(format!(
            "type name {name} must not start with {RELATIONSHIP_PROP_MARKER}"
        )));
    }
    Ok(())
}

/// Names are non-empty ASCII identifiers without the key delimiter.
///
/// A trailing underscore is refused: `email_` would otherwise share the
/// index key prefix `…email___` with `email`.
fn check_name(name: &str) -> Result<(), GraphError> {
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.contains(DELIMITER)
        && !name.ends_with('_');
    if well_formed {
        Ok(())
    } else {
        Err(invalid(format!(
            "invalid name {name:?}: use letters, digits and inner underscores only"
        ))
        .with("name", name))
    }
}

fn invalid(detail: String) -> GraphError {
    GraphError::validation(ErrorCode::SchemaValidation, detail)
}

// =============================================================================
// TESTS
// =============================================================================
