//! # Property-Based Tests
//!
//! Schema acceptance, sort-index ordering and request determinism.

use arbor_core::schema::validate;
use arbor_core::{Database, KvStore, ListOptions, MemoryStore, Schema};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

// =============================================================================
// STRATEGIES
// =============================================================================

/// `(node, prop, direction, target)` uses of the single relationship `link`.
fn usages() -> impl Strategy<Value = Vec<(&'static str, &'static str, &'static str, &'static str)>>
{
    vec(
        (
            prop::sample::select(vec!["A", "B"]),
            prop::sample::select(vec!["p0", "p1", "p2"]),
            prop::sample::select(vec!["forward", "reverse", "bidirectional"]),
            prop::sample::select(vec!["A", "B", "Ghost"]),
        ),
        0..4,
    )
}

fn link_schema(
    uses: &BTreeMap<(&str, &str), (&str, &str)>,
) -> Value {
    let mut nodes = Map::new();
    for node in ["A", "B"] {
        let mut props = Map::new();
        props.insert("name".into(), json!({ "is": "prop", "dataType": "string" }));
        for ((owner, prop), (direction, target)) in uses {
            if *owner == node {
                props.insert(
                    (*prop).to_string(),
                    json!({ "is": "relationshipProp", "direction": direction,
                            "node": target, "relationship": "link" }),
                );
            }
        }
        nodes.insert(node.into(), Value::Object(props));
    }
    json!({ "nodes": nodes, "relationships": { "link": { "kind": "manyToMany" } } })
}

fn expected_valid(uses: &BTreeMap<(&str, &str), (&str, &str)>) -> bool {
    if uses.is_empty() || uses.values().any(|(_, target)| *target == "Ghost") {
        return false;
    }
    let with = |d: &str| -> Vec<&str> {
        uses.iter()
            .filter(|(_, (direction, _))| *direction == d)
            .map(|((_, prop), _)| *prop)
            .collect()
    };
    let (bidirectional, forward, reverse) =
        (with("bidirectional"), with("forward"), with("reverse"));
    match (bidirectional.len(), forward.len(), reverse.len()) {
        (1, 0, 0) => true,
        (0, 1, 1) => forward[0] != reverse[0],
        _ => false,
    }
}

fn ranked_db() -> Database<MemoryStore> {
    let mut db = Database::new(MemoryStore::new());
    db.execute_json(
        &json!({ "id": "SchemaAdd", "schema": { "nodes": { "Item": {
            "rank": { "is": "prop", "dataType": "number", "sortIndex": true }
        }}}}),
        None,
    )
    .expect("schema");
    db
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Validation accepts iff the relationship is aligned and every target exists.
    #[test]
    fn validation_accepts_exactly_aligned_schemas(raw in usages()) {
        let uses: BTreeMap<(&str, &str), (&str, &str)> = raw
            .into_iter()
            .map(|(node, prop, direction, target)| ((node, prop), (direction, target)))
            .collect();
        let schema = Schema::from_value(link_schema(&uses)).expect("decodes");
        prop_assert_eq!(validate(&schema).is_ok(), expected_valid(&uses));
    }

    /// The stored sort index is a stable ascending order of the values.
    #[test]
    fn sort_index_is_stably_ordered(ranks in vec(-50i64..50, 1..20)) {
        let mut db = ranked_db();
        let items: Vec<Value> = ranks
            .iter()
            .enumerate()
            .map(|(i, rank)| json!({ "id": "NodeInsert", "node": "Item",
                                     "props": { "uid": format!("_:{i}"), "rank": rank } }))
            .collect();
        let response = db.execute_json(&Value::Array(items), None).expect("insert");
        let ids = &response.manifest.new_ids;

        let mut expected: Vec<(i64, usize)> =
            ranks.iter().copied().zip(0..ranks.len()).collect();
        expected.sort_by_key(|(rank, _)| *rank);
        let expected: Vec<&String> =
            expected.iter().map(|(_, i)| &ids[&format!("_:{i}")]).collect();

        let stored = db
            .store()
            .get("$index_sort___Item___rank")
            .expect("get")
            .expect("sort index");
        prop_assert_eq!(stored, json!(expected));

        let response = db
            .execute_json(
                &json!({ "id": "NodeQuery", "node": "Item", "slot": "items",
                         "select": { "options": { "sort": { "prop": "rank", "how": "dsc" } } } }),
                None,
            )
            .expect("query");
        let seen: Vec<i64> = response.now["items"]
            .as_array()
            .expect("rows")
            .iter()
            .filter_map(|row| row["rank"].as_i64())
            .collect();
        prop_assert!(seen.windows(2).all(|pair| pair[0] >= pair[1]));
        prop_assert_eq!(seen.len(), ranks.len());
    }

    /// Identical envelopes on fresh stores produce identical stores.
    #[test]
    fn identical_requests_produce_identical_stores(ranks in vec(0i64..10, 0..10)) {
        let items: Vec<Value> = ranks
            .iter()
            .map(|rank| json!({ "id": "NodeInsert", "node": "Item", "props": { "rank": rank } }))
            .collect();

        let mut first = ranked_db();
        let mut second = ranked_db();
        first.execute_json(&Value::Array(items.clone()), None).expect("first");
        second.execute_json(&Value::Array(items), None).expect("second");

        prop_assert_eq!(
            first.store().list(&ListOptions::all()).expect("list"),
            second.store().list(&ListOptions::all()).expect("list")
        );
    }
}
