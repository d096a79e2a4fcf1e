//! # Schema Index
//!
//! Lookup structures derived from a validated schema. Built in one pass and
//! never patched; a schema change produces a new index.

use super::{DataType, Direction, PropDef, RelationshipPropDef, Schema};
use std::collections::{BTreeMap, BTreeSet};

/// A prop that must be present on every record of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredProp {
    /// A value prop with its expected runtime type.
    Value { prop: String, data_type: DataType },
    /// A relationship prop that needs at least one edge.
    Relationship {
        prop: String,
        relationship: String,
        direction: Direction,
    },
}

impl RequiredProp {
    /// The prop name.
    #[must_use]
    pub fn prop(&self) -> &str {
        match self {
            Self::Value { prop, .. } | Self::Relationship { prop, .. } => prop,
        }
    }
}

/// One side of a relationship: the node type holding the prop and its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipEnd {
    /// The node type the prop is declared on.
    pub holder: String,
    /// The prop definition.
    pub def: RelationshipPropDef,
}

/// Derived lookup structures for one schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    pub node_names: BTreeSet<String>,
    pub relationship_names: BTreeSet<String>,
    /// Type name -> props flagged `mustBeDefined`.
    pub must_be_defined: BTreeMap<String, Vec<RequiredProp>>,
    /// Relationship name -> (prop name -> end), for traversal from either side.
    pub relationship_props: BTreeMap<String, BTreeMap<String, RelationshipEnd>>,
    /// (node name, relationship name) -> relationship prop names on that node.
    pub node_relationship_props: BTreeMap<(String, String), Vec<String>>,
    /// (node name, prop name) of every cascading relationship prop.
    pub cascade: BTreeSet<(String, String)>,
}

impl SchemaIndex {
    /// Derive every lookup structure from a (validated) schema.
    #[must_use]
    pub fn build(schema: &Schema) -> Self {
        let mut index = Self {
            node_names: schema.nodes.keys().cloned().collect(),
            relationship_names: schema.relationships.keys().cloned().collect(),
            ..Self::default()
        };

        for (node_name, props) in &schema.nodes {
            for (prop_name, def) in props {
                match def {
                    PropDef::Prop(value) => {
                        if value.must_be_defined {
                            index.require(
                                node_name,
                                RequiredProp::Value {
                                    prop: prop_name.clone(),
                                    data_type: value.data_type,
                                },
                            );
                        }
                    }
                    PropDef::RelationshipProp(rel) => {
                        if rel.must_be_defined {
                            index.require(
                                node_name,
                                RequiredProp::Relationship {
                                    prop: prop_name.clone(),
                                    relationship: rel.relationship.clone(),
                                    direction: rel.direction,
                                },
                            );
                        }
                        if rel.cascade {
                            index.cascade.insert((node_name.clone(), prop_name.clone()));
                        }
                        index
                            .relationship_props
                            .entry(rel.relationship.clone())
                            .or_default()
                            .insert(
                                prop_name.clone(),
                                RelationshipEnd {
                                    holder: node_name.clone(),
                                    def: rel.clone(),
                                },
                            );
                        index
                            .node_relationship_props
                            .entry((node_name.clone(), rel.relationship.clone()))
                            .or_default()
                            .push(prop_name.clone());
                    }
                }
            }
        }

        for (relationship_name, relationship) in &schema.relationships {
            for (prop_name, value) in &relationship.props {
                if value.must_be_defined {
                    index.require(
                        relationship_name,
                        RequiredProp::Value {
                            prop: prop_name.clone(),
                            data_type: value.data_type,
                        },
                    );
                }
            }
        }

        index
    }

    fn require(&mut self, type_name: &str, prop: RequiredProp) {
        self.must_be_defined
            .entry(type_name.to_string())
            .or_default()
            .push(prop);
    }

    /// Required props of a node or relationship type.
    #[must_use]
    pub fn required(&self, type_name: &str) -> &[RequiredProp] {
        self.must_be_defined
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Relationship prop names a node type declares for a relationship.
    #[must_use]
    pub fn props_for(&self, node: &str, relationship: &str) -> &[String] {
        self.node_relationship_props
            .get(&(node.to_string(), relationship.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The prop a node sees a relationship edge through, given which endpoint it is.
    ///
    /// Endpoint `a` sees the forward (or bidirectional) prop, endpoint `b` the
    /// reverse (or bidirectional) prop.
    #[must_use]
    pub fn prop_for_endpoint(
        &self,
        node: &str,
        relationship: &str,
        is_a: bool,
    ) -> Option<(&str, &RelationshipPropDef)> {
        let ends = self.relationship_props.get(relationship)?;
        self.props_for(node, relationship).iter().find_map(|prop| {
            let end = ends.get(prop)?;
            let matches = match end.def.direction {
                Direction::Bidirectional => true,
                Direction::Forward => is_a,
                Direction::Reverse => !is_a,
            };
            matches.then_some((prop.as_str(), &end.def))
        })
    }

    /// Whether deleting a `node` record cascades through `prop`.
    #[must_use]
    pub fn is_cascade(&self, node: &str, prop: &str) -> bool {
        self.cascade.contains(&(node.to_string(), prop.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog_schema() -> Schema {
        Schema::from_value(json!({
            "nodes": {
                "User": {
                    "name": { "is": "prop", "dataType": "string", "mustBeDefined": true },
                    "posts": { "is": "relationshipProp", "direction": "forward",
                               "node": "Post", "relationship": "wrote", "cascade": true }
                },
                "Post": {
                    "title": { "is": "prop", "dataType": "string" },
                    "author": { "is": "relationshipProp", "direction": "reverse",
                                "node": "User", "relationship": "wrote", "mustBeDefined": true }
                }
            },
            "relationships": { "wrote": { "kind": "oneToMany",
                "props": { "_at": { "dataType": "iso", "mustBeDefined": true } } } }
        }))
        .expect("decode")
    }

    #[test]
    fn required_props_cover_nodes_and_relationships() {
        let index = SchemaIndex::build(&blog_schema());
        assert_eq!(index.required("User").len(), 1);
        assert_eq!(index.required("User")[0].prop(), "name");
        assert!(matches!(
            &index.required("Post")[0],
            RequiredProp::Relationship { direction: Direction::Reverse, .. }
        ));
        assert_eq!(index.required("wrote")[0].prop(), "_at");
        assert!(index.required("Nothing").is_empty());
    }

    #[test]
    fn relationship_props_are_reachable_from_either_side() {
        let index = SchemaIndex::build(&blog_schema());
        let ends = &index.relationship_props["wrote"];
        assert_eq!(ends["posts"].holder, "User");
        assert_eq!(ends["author"].holder, "Post");
        assert_eq!(index.props_for("User", "wrote"), ["posts".to_string()]);
    }

    #[test]
    fn endpoint_side_picks_the_prop() {
        let index = SchemaIndex::build(&blog_schema());
        assert_eq!(
            index.prop_for_endpoint("User", "wrote", true).map(|(p, _)| p),
            Some("posts")
        );
        assert_eq!(
            index.prop_for_endpoint("Post", "wrote", false).map(|(p, _)| p),
            Some("author")
        );
        assert!(index.prop_for_endpoint("User", "wrote", false).is_none());
    }

    #[test]
    fn cascade_set_is_keyed_by_holder() {
        let index = SchemaIndex::build(&blog_schema());
        assert!(index.is_cascade("User", "posts"));
        assert!(!index.is_cascade("Post", "author"));
    }
}
