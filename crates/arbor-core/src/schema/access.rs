//! # Access-Control Schema
//!
//! The node and relationship types the permission model reads:
//!
//! ```text
//! Role --UserHasRole--> User          (oneToMany, User.role is singular)
//! Role --RoleRevokes--> Revocation    (manyToMany)
//! ```
//!
//! A caller's identity is the `User` whose unique `token` matches the bearer
//! token. Each `Revocation` denies one action on one scope.

use super::{
    Cardinality, DataType, Direction, NodeType, PropDef, RelationshipPropDef, RelationshipType,
    Schema, ValuePropDef,
};
use std::collections::BTreeMap;

pub const USER_NODE: &str = "User";
pub const ROLE_NODE: &str = "Role";
pub const REVOCATION_NODE: &str = "Revocation";
pub const USER_HAS_ROLE: &str = "UserHasRole";
pub const ROLE_REVOKES: &str = "RoleRevokes";

pub const TOKEN_PROP: &str = "token";
pub const ROLE_PROP: &str = "role";
pub const REVOCATIONS_PROP: &str = "revocations";

/// The access-control types, ready to merge through a schema add.
#[must_use]
pub fn access_control_schema() -> Schema {
    let mut user = NodeType::new();
    user.insert(
        TOKEN_PROP.into(),
        PropDef::Prop(ValuePropDef {
            unique_index: true,
            ..ValuePropDef::new(DataType::String)
        }),
    );
    user.insert(
        ROLE_PROP.into(),
        relationship(Direction::Reverse, ROLE_NODE, USER_HAS_ROLE),
    );

    let mut role = NodeType::new();
    role.insert("name".into(), string_prop());
    role.insert(
        "users".into(),
        relationship(Direction::Forward, USER_NODE, USER_HAS_ROLE),
    );
    role.insert(
        REVOCATIONS_PROP.into(),
        relationship(Direction::Forward, REVOCATION_NODE, ROLE_REVOKES),
    );

    let mut revocation = NodeType::new();
    for prop in [
        "action",
        "nodeName",
        "relationshipName",
        "propName",
        "allowPropName",
    ] {
        revocation.insert(prop.into(), string_prop());
    }
    revocation.insert(
        "schema".into(),
        PropDef::Prop(ValuePropDef::new(DataType::Boolean)),
    );
    revocation.insert(
        "roles".into(),
        relationship(Direction::Reverse, ROLE_NODE, ROLE_REVOKES),
    );

    let nodes = BTreeMap::from([
        (USER_NODE.to_string(), user),
        (ROLE_NODE.to_string(), role),
        (REVOCATION_NODE.to_string(), revocation),
    ]);
    let relationships = BTreeMap::from([
        (
            USER_HAS_ROLE.to_string(),
            RelationshipType {
                kind: Cardinality::OneToMany,
                props: BTreeMap::new(),
            },
        ),
        (
            ROLE_REVOKES.to_string(),
            RelationshipType {
                kind: Cardinality::ManyToMany,
                props: BTreeMap::new(),
            },
        ),
    ]);

    Schema {
        nodes,
        relationships,
    }
}

fn string_prop() -> PropDef {
    PropDef::Prop(ValuePropDef::new(DataType::String))
}

fn relationship(direction: Direction, node: &str, relationship: &str) -> PropDef {
    PropDef::RelationshipProp(RelationshipPropDef {
        direction,
        node: node.into(),
        relationship: relationship.into(),
        must_be_defined: false,
        cascade: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaIndex, validate};

    #[test]
    fn access_schema_is_valid() {
        let schema = access_control_schema();
        validate(&schema).expect("valid");
        let index = SchemaIndex::build(&schema);
        assert!(index.node_names.contains(REVOCATION_NODE));
    }

    #[test]
    fn user_role_is_singular() {
        let schema = access_control_schema();
        let role = schema.relationship_prop(USER_NODE, ROLE_PROP).expect("role");
        let kind = schema.relationships[USER_HAS_ROLE].kind;
        assert!(kind.is_singular(role.direction));
    }
}
