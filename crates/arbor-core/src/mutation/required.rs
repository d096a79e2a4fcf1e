//! End-of-request required-field pass.
//!
//! Runs over the buffered state after every item has been applied, so a
//! record may be completed by later items of the same request.

use crate::passport::Passport;
use crate::schema::{Direction, RequiredProp};
use crate::types::{ErrorCode, GraphError, Record};

/// Check every staged record against its type's required props.
///
/// A required relationship prop is satisfied only by an edge that has the
/// record on the side its direction implies; a bare adjacency entry is not
/// enough, since the other endpoint may have supplied it.
pub fn check(passport: &Passport<'_>) -> Result<(), GraphError> {
    for uid in &passport.staged {
        let Some(record) = passport.cache.record(uid)? else {
            continue;
        };
        for required in passport.snapshot.index.required(record.type_name()) {
            match required {
                RequiredProp::Value { prop, data_type } => {
                    if !record.props().get(prop).is_some_and(|v| data_type.accepts(v)) {
                        return Err(GraphError::validation(
                            ErrorCode::MissingRequiredField,
                            format!("{}.{prop} must be defined", record.type_name()),
                        )
                        .with("type", record.type_name())
                        .with("prop", prop.as_str())
                        .with("uid", uid.as_str()));
                    }
                }
                RequiredProp::Relationship {
                    prop,
                    relationship,
                    direction,
                } => {
                    let Record::Node(node) = &record else {
                        continue;
                    };
                    let mut satisfied = false;
                    for rel_uid in node.adjacency.get(relationship).into_iter().flatten() {
                        let Some(rel) = passport.cache.relationship(rel_uid)? else {
                            continue;
                        };
                        satisfied = match direction {
                            Direction::Forward => rel.a == node.uid,
                            Direction::Reverse => rel.b == node.uid,
                            Direction::Bidirectional => rel.a == node.uid || rel.b == node.uid,
                        };
                        if satisfied {
                            break;
                        }
                    }
                    if !satisfied {
                        return Err(GraphError::validation(
                            ErrorCode::MissingRequiredRelationship,
                            format!("{}.{prop} needs a {relationship} edge", node.node),
                        )
                        .with("node", node.node.as_str())
                        .with("prop", prop.as_str())
                        .with("uid", uid.as_str()));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::schema::{Schema, SchemaSnapshot};
    use crate::storage::MemoryStore;
    use crate::types::{NodeRecord, RelationshipRecord};
    use serde_json::json;
    use std::sync::Arc;

    fn snapshot() -> Arc<SchemaSnapshot> {
        let schema = Schema::from_value(json!({
            "nodes": {
                "User": {
                    "name": { "is": "prop", "dataType": "string", "mustBeDefined": true },
                    "posts": { "is": "relationshipProp", "direction": "forward",
                               "node": "Post", "relationship": "wrote" }
                },
                "Post": {
                    "author": { "is": "relationshipProp", "direction": "reverse",
                                "node": "User", "relationship": "wrote", "mustBeDefined": true }
                }
            },
            "relationships": { "wrote": { "kind": "oneToMany" } }
        }))
        .expect("schema");
        Arc::new(SchemaSnapshot::new(schema).expect("valid"))
    }

    #[test]
    fn missing_value_props_fail() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot()), None).expect("build");
        passport
            .cache
            .put_record(&Record::Node(NodeRecord::new("1", "User")))
            .expect("put");
        passport.staged.insert("1".into());

        let err = check(&passport).expect_err("name missing");
        assert_eq!(err.code(), Some(ErrorCode::MissingRequiredField));
    }

    #[test]
    fn reverse_props_need_the_record_on_side_b() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, Some(snapshot()), None).expect("build");

        // The post sits on side `a`, so it authored the edge instead of receiving it.
        let mut post = NodeRecord::new("2", "Post");
        post.attach("wrote", "3");
        passport.cache.put_record(&Record::Node(post)).expect("post");
        let rel = RelationshipRecord {
            uid: "3".into(),
            relationship: "wrote".into(),
            a: "2".into(),
            b: "1".into(),
            props: Default::default(),
        };
        passport
            .cache
            .put_record(&Record::Relationship(rel.clone()))
            .expect("rel");
        passport.staged.insert("2".into());
        let err = check(&passport).expect_err("wrong side");
        assert_eq!(err.code(), Some(ErrorCode::MissingRequiredRelationship));

        let flipped = RelationshipRecord {
            a: "1".into(),
            b: "2".into(),
            ..rel
        };
        passport
            .cache
            .put_record(&Record::Relationship(flipped))
            .expect("rel");
        check(&passport).expect("satisfied");
    }
}
