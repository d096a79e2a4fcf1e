//! # Core Type Definitions
//!
//! This module contains the stored record shapes and the error type:
//! - Records (`NodeRecord`, `RelationshipRecord`, `Record`)
//! - Prop maps (`Props`)
//! - Error types (`GraphError`, `ErrorKind`, `ErrorCode`)
//! - Value ordering helpers shared by sort indices and queries
//!
//! ## Arena Model
//!
//! Nodes and relationships reference each other bidirectionally. They are
//! kept as flat records keyed by opaque string ids and resolved through the
//! cache on demand; no native pointer graph is ever built.

mod error;
mod value;

pub use error::{ErrorCode, ErrorContext, ErrorKind, GraphError};
pub use value::{compare_values, number_value, values_equal};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Prop values of a stored record, keyed by prop name.
pub type Props = Map<String, Value>;

// =============================================================================
// NODE RECORD
// =============================================================================

/// A stored graph node.
///
/// `adjacency` is keyed by relationship name and holds relationship record
/// ids, never node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// The node id.
    pub uid: String,
    /// The node type name.
    pub node: String,
    /// Value props.
    #[serde(default)]
    pub props: Props,
    /// Relationship name -> relationship ids touching this node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub adjacency: BTreeMap<String, Vec<String>>,
}

impl NodeRecord {
    /// Create a node with no props and no edges.
    #[must_use]
    pub fn new(uid: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            node: node.into(),
            props: Props::new(),
            adjacency: BTreeMap::new(),
        }
    }

    /// Append a relationship id to an adjacency array, ignoring duplicates.
    pub fn attach(&mut self, relationship: &str, relationship_uid: &str) {
        let entries = self.adjacency.entry(relationship.to_string()).or_default();
        if !entries.iter().any(|id| id == relationship_uid) {
            entries.push(relationship_uid.to_string());
        }
    }

    /// Remove a relationship id from an adjacency array.
    ///
    /// Empty arrays are dropped. Returns `true` if something was removed.
    pub fn detach(&mut self, relationship: &str, relationship_uid: &str) -> bool {
        let Some(entries) = self.adjacency.get_mut(relationship) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|id| id != relationship_uid);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.adjacency.remove(relationship);
        }
        removed
    }
}

// =============================================================================
// RELATIONSHIP RECORD
// =============================================================================

/// A stored relationship.
///
/// Storage is undirected: `a` and `b` are plain endpoints. Which endpoint is
/// "forward" is schema-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// The relationship id.
    #[serde(rename = "_uid")]
    pub uid: String,
    /// The relationship type name.
    pub relationship: String,
    /// First endpoint (holder of the forward prop).
    pub a: String,
    /// Second endpoint (holder of the reverse prop).
    pub b: String,
    /// Relationship props (names start with `_`).
    #[serde(default)]
    pub props: Props,
}

impl RelationshipRecord {
    /// The endpoint opposite `uid`, if `uid` is an endpoint.
    #[must_use]
    pub fn other_endpoint(&self, uid: &str) -> Option<&str> {
        if self.a == uid {
            Some(&self.b)
        } else if self.b == uid {
            Some(&self.a)
        } else {
            None
        }
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Any record stored under an id key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Record {
    Node(NodeRecord),
    Relationship(RelationshipRecord),
}

impl Record {
    /// Decode a stored value.
    pub fn from_value(value: Value) -> Result<Self, GraphError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encode for storage.
    pub fn to_value(&self) -> Result<Value, GraphError> {
        Ok(serde_json::to_value(self)?)
    }

    /// The record id.
    #[must_use]
    pub fn uid(&self) -> &str {
        match self {
            Self::Node(n) => &n.uid,
            Self::Relationship(r) => &r.uid,
        }
    }

    /// The node or relationship type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Node(n) => &n.node,
            Self::Relationship(r) => &r.relationship,
        }
    }

    /// Value props.
    #[must_use]
    pub fn props(&self) -> &Props {
        match self {
            Self::Node(n) => &n.props,
            Self::Relationship(r) => &r.props,
        }
    }

    /// Mutable value props.
    pub fn props_mut(&mut self) -> &mut Props {
        match self {
            Self::Node(n) => &mut n.props,
            Self::Relationship(r) => &mut r.props,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attach_ignores_duplicates() {
        let mut node = NodeRecord::new("1", "User");
        node.attach("isFriendsWith", "9");
        node.attach("isFriendsWith", "9");
        assert_eq!(node.adjacency["isFriendsWith"], vec!["9".to_string()]);
    }

    #[test]
    fn detach_drops_empty_arrays() {
        let mut node = NodeRecord::new("1", "User");
        node.attach("isFriendsWith", "9");
        assert!(node.detach("isFriendsWith", "9"));
        assert!(node.adjacency.is_empty());
        assert!(!node.detach("isFriendsWith", "9"));
    }

    #[test]
    fn records_are_tagged_by_kind() {
        let rel = Record::Relationship(RelationshipRecord {
            uid: "3".into(),
            relationship: "isFriendsWith".into(),
            a: "1".into(),
            b: "2".into(),
            props: Props::new(),
        });
        let value = rel.to_value().expect("encode");
        assert_eq!(value["kind"], "relationship");
        assert_eq!(value["_uid"], "3");

        let decoded = Record::from_value(value).expect("decode");
        assert_eq!(decoded, rel);
    }

    #[test]
    fn other_endpoint_requires_membership() {
        let rel = RelationshipRecord {
            uid: "3".into(),
            relationship: "r".into(),
            a: "1".into(),
            b: "2".into(),
            props: Props::new(),
        };
        assert_eq!(rel.other_endpoint("1"), Some("2"));
        assert_eq!(rel.other_endpoint("2"), Some("1"));
        assert_eq!(rel.other_endpoint("7"), None);
    }

    #[test]
    fn non_record_values_fail_to_decode() {
        assert!(Record::from_value(json!(["1", "2"])).is_err());
    }
}
