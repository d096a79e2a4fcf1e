//! # Schema
//!
//! The declared shape of a database: node types, relationship types and the
//! prop definitions that drive validation, indexing, traversal and cascade.
//!
//! - `validate` checks a document (pure, no side effects)
//! - `index` derives the lookup structures from a valid document
//! - `access` supplies the identity/role/revocation types used by permissions
//!
//! A validated schema and its derived structures travel together as one
//! immutable `SchemaSnapshot`. Any schema change builds a fresh snapshot;
//! nothing is patched in place.

pub mod access;
pub mod index;
pub mod validate;

pub use access::access_control_schema;
pub use index::{RelationshipEnd, RequiredProp, SchemaIndex};
pub use validate::validate;

use crate::types::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// PROP DEFINITIONS
// =============================================================================

/// Runtime type of a value prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    /// RFC 3339 timestamp string.
    Iso,
    /// Plaintext on input, replaced by a signature at write time.
    Hash,
}

impl DataType {
    /// Check a JSON value against this data type.
    #[must_use]
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String | Self::Hash => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Iso => value.as_str().is_some_and(|s| parse_iso(s).is_some()),
        }
    }

    /// Lowercase name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Iso => "iso",
            Self::Hash => "hash",
        }
    }
}

/// Parse an RFC 3339 timestamp.
#[must_use]
pub fn parse_iso(value: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339).ok()
}

/// Which endpoint of a relationship a prop is declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Declared on endpoint `a`.
    Forward,
    /// Declared on endpoint `b`.
    Reverse,
    /// Declared on both endpoints (same node type).
    Bidirectional,
}

/// Cardinality of a relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Whether a prop with this direction resolves to at most one node.
    ///
    /// In a one-to-many relationship each `b` has exactly one `a`, so only
    /// the reverse side is singular.
    #[must_use]
    pub const fn is_singular(self, direction: Direction) -> bool {
        match self {
            Self::OneToOne => true,
            Self::OneToMany => matches!(direction, Direction::Reverse),
            Self::ManyToMany => false,
        }
    }
}

/// A value prop definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuePropDef {
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub must_be_defined: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sort_index: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique_index: bool,
}

impl ValuePropDef {
    /// A plain, optional, unindexed prop.
    #[must_use]
    pub const fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            must_be_defined: false,
            sort_index: false,
            unique_index: false,
        }
    }
}

/// A relationship prop definition (lives on a node type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipPropDef {
    pub direction: Direction,
    /// Target node type name.
    pub node: String,
    /// Relationship type name.
    pub relationship: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub must_be_defined: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cascade: bool,
}

/// Any prop on a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "is", rename_all = "camelCase")]
pub enum PropDef {
    Prop(ValuePropDef),
    RelationshipProp(RelationshipPropDef),
}

/// Node type: prop name -> definition.
pub type NodeType = BTreeMap<String, PropDef>;

/// A relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub kind: Cardinality,
    /// Relationship props; names start with `_`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, ValuePropDef>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

// =============================================================================
// SCHEMA
// =============================================================================

/// The schema document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeType>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipType>,
}

impl Schema {
    /// Decode a schema document, reporting malformed input as a validation error.
    pub fn from_value(value: serde_json::Value) -> Result<Self, GraphError> {
        serde_json::from_value(value).map_err(|e| {
            GraphError::validation(crate::types::ErrorCode::SchemaValidation, e.to_string())
        })
    }

    /// Add-or-merge another (possibly partial) document into this one.
    ///
    /// New types are added; props of existing types are added or replaced.
    pub fn merge(&mut self, other: Schema) {
        for (name, props) in other.nodes {
            self.nodes.entry(name).or_default().extend(props);
        }
        for (name, incoming) in other.relationships {
            match self.relationships.get_mut(&name) {
                Some(existing) => {
                    existing.kind = incoming.kind;
                    existing.props.extend(incoming.props);
                }
                None => {
                    self.relationships.insert(name, incoming);
                }
            }
        }
    }

    /// Look up a value prop on a node or relationship type.
    #[must_use]
    pub fn value_prop(&self, type_name: &str, prop: &str) -> Option<&ValuePropDef> {
        if let Some(node) = self.nodes.get(type_name) {
            return match node.get(prop) {
                Some(PropDef::Prop(def)) => Some(def),
                _ => None,
            };
        }
        self.relationships
            .get(type_name)
            .and_then(|rel| rel.props.get(prop))
    }

    /// Look up a relationship prop on a node type.
    #[must_use]
    pub fn relationship_prop(&self, node: &str, prop: &str) -> Option<&RelationshipPropDef> {
        match self.nodes.get(node)?.get(prop)? {
            PropDef::RelationshipProp(def) => Some(def),
            PropDef::Prop(_) => None,
        }
    }

    /// Every value prop of a node or relationship type.
    pub fn value_props<'a>(
        &'a self,
        type_name: &str,
    ) -> Box<dyn Iterator<Item = (&'a String, &'a ValuePropDef)> + 'a> {
        if let Some(node) = self.nodes.get(type_name) {
            return Box::new(node.iter().filter_map(|(name, def)| match def {
                PropDef::Prop(v) => Some((name, v)),
                PropDef::RelationshipProp(_) => None,
            }));
        }
        match self.relationships.get(type_name) {
            Some(rel) => Box::new(rel.props.iter()),
            None => Box::new(std::iter::empty()),
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A validated schema paired with its derived lookup structures.
///
/// Replaced wholesale whenever the schema changes.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    pub schema: Schema,
    pub index: SchemaIndex,
}

impl SchemaSnapshot {
    /// Validate a schema and derive its index.
    pub fn new(schema: Schema) -> Result<Self, GraphError> {
        validate(&schema)?;
        let index = SchemaIndex::build(&schema);
        Ok(Self { schema, index })
    }

    /// Whether `name` is a node type.
    #[must_use]
    pub fn is_node(&self, name: &str) -> bool {
        self.index.node_names.contains(name)
    }

    /// Whether `name` is a relationship type.
    #[must_use]
    pub fn is_relationship(&self, name: &str) -> bool {
        self.index.relationship_names.contains(name)
    }
}

// =============================================================================
// TESTS
// =============================================================================
