//! # Database
//!
//! The request orchestrator: owns a backing store and runs request
//! envelopes against it.
//!
//! One request is processed start to finish against one [`Passport`]:
//!
//! 1. Envelope size check
//! 2. Placeholder resolution (both passes, before any item runs)
//! 3. Items dispatched in order, each filling its response slot
//! 4. Pending sort-index rebuilds flushed
//! 5. Required-field pass over every staged record
//!
//! The schema snapshot is kept between requests and rebuilt only after a
//! request changes or fails to load it.

use crate::cache::Cache;
use crate::mutation::{WriteMode, delete, node, placeholders, relationship, required};
use crate::mutation::{schema_ops, sort_index};
use crate::passport::{Action, Passport};
use crate::primitives::{DEFAULT_MAX_ITEMS_PER_REQUEST, ENFORCE_PERMISSIONS_KEY};
use crate::query::{self, QueryTarget};
use crate::request::RequestItem;
use crate::response::Response;
use crate::schema::SchemaSnapshot;
use crate::security::Signer;
use crate::storage::{KvStore, ListOptions};
use crate::types::{ErrorCode, GraphError, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

// =============================================================================
// OPTIONS
// =============================================================================

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Larger envelopes are rejected before anything runs.
    pub max_items_per_request: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_items_per_request: DEFAULT_MAX_ITEMS_PER_REQUEST,
        }
    }
}

// =============================================================================
// DATABASE
// =============================================================================

/// A graph database over one backing store.
pub struct Database<S: KvStore> {
    store: S,
    signer: Option<Arc<dyn Signer>>,
    options: EngineOptions,
    snapshot: Option<Arc<SchemaSnapshot>>,
}

impl<S: KvStore + std::fmt::Debug> std::fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("store", &self.store)
            .field("signer", &self.signer.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: KvStore> Database<S> {
    /// Open a database over `store` with default options.
    pub fn new(store: S) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    /// Open a database over `store`.
    pub fn with_options(store: S, options: EngineOptions) -> Self {
        Self {
            store,
            signer: None,
            options,
            snapshot: None,
        }
    }

    /// Attach the capability used to sign and verify `hash` props.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Active options.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Borrow the backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the backing store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Turn permission enforcement on or off.
    ///
    /// Writes the settings record directly; no permission check applies.
    pub fn set_enforce_permissions(&mut self, enforce: bool) -> Result<(), GraphError> {
        self.store.put(ENFORCE_PERMISSIONS_KEY, Value::Bool(enforce))?;
        tracing::info!(enforce, "permission enforcement updated");
        Ok(())
    }

    /// Decode and run one item or an array of items.
    pub fn execute_json(
        &mut self,
        request: &Value,
        token: Option<&str>,
    ) -> Result<Response, GraphError> {
        let items = RequestItem::parse_many(request)?;
        self.execute(items, token)
    }

    /// Run a request envelope.
    ///
    /// Writes issued before a failing item stay in the store.
    pub fn execute(
        &mut self,
        items: Vec<RequestItem>,
        token: Option<&str>,
    ) -> Result<Response, GraphError> {
        if items.len() > self.options.max_items_per_request {
            return Err(GraphError::validation(
                ErrorCode::InvalidRequest,
                format!(
                    "request carries {} items; the limit is {}",
                    items.len(),
                    self.options.max_items_per_request
                ),
            )
            .with("items", items.len())
            .with("limit", self.options.max_items_per_request));
        }

        let snapshot = self.snapshot.take();
        let signer = self.signer.clone();
        let cache = Cache::new(&mut self.store);
        let result = run(cache, items, token, snapshot, signer);
        match result {
            Ok((response, snapshot)) => {
                self.snapshot = Some(snapshot);
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(kind = ?err.kind(), error = %err, "request failed");
                Err(err)
            }
        }
    }
}

fn run(
    cache: Cache<'_>,
    items: Vec<RequestItem>,
    token: Option<&str>,
    snapshot: Option<Arc<SchemaSnapshot>>,
    signer: Option<Arc<dyn Signer>>,
) -> Result<(Response, Arc<SchemaSnapshot>), GraphError> {
    let mut passport = Passport::build(cache, token, snapshot, signer)?;
    let items = placeholders::resolve(&mut passport, items)?;

    let count = items.len();
    for item in items {
        tracing::debug!(item = item.name(), "dispatching request item");
        dispatch(&mut passport, item)?;
    }

    sort_index::flush(&mut passport)?;
    required::check(&passport)?;

    let snapshot = Arc::clone(&passport.snapshot);
    let response = Response::collect(passport);
    tracing::debug!(
        items = count,
        new_ids = response.manifest.new_ids.len(),
        deleted = response.manifest.deleted_keys.len(),
        "request complete"
    );
    Ok((response, snapshot))
}

// =============================================================================
// DISPATCH
// =============================================================================

fn dispatch(passport: &mut Passport<'_>, item: RequestItem) -> Result<(), GraphError> {
    match item {
        RequestItem::Empty => {
            passport.check_schema(Action::Insert)?;
            passport.cache.delete_all()?;
            passport.staged.clear();
            passport.sort_pending.clear();
            passport.reload_schema()?;
            tracing::info!("store emptied");
        }
        RequestItem::BackupGet { slot } => {
            passport.check_schema(Action::Read)?;
            let backup: Map<String, Value> =
                passport.cache.list(&ListOptions::all())?.into_iter().collect();
            let backup = Value::Object(backup);
            passport.set_slot(&slot, backup.clone(), backup);
        }
        RequestItem::BackupLoad {
            backup,
            skip_data_delete,
        } => {
            passport.check_schema(Action::Insert)?;
            if !skip_data_delete {
                passport.cache.delete_all()?;
                passport.staged.clear();
                passport.sort_pending.clear();
            }
            let keys = backup.len();
            for (key, value) in backup {
                passport.cache.put(&key, value)?;
            }
            passport.reload_schema()?;
            tracing::info!(keys, wiped = !skip_data_delete, "backup loaded");
        }

        RequestItem::SchemaGet { slot } => {
            passport.check_schema(Action::Read)?;
            let schema = serde_json::to_value(passport.schema())?;
            passport.set_slot(&slot, schema.clone(), schema);
        }
        RequestItem::SchemaAdd { schema, slot } => {
            schema_ops::add_schema(passport, schema)?;
            if let Some(slot) = slot {
                let schema = serde_json::to_value(passport.schema())?;
                passport.set_slot(&slot, schema.clone(), schema);
            }
        }
        RequestItem::SchemaRenameNodes { renames } => schema_ops::rename_nodes(passport, &renames)?,
        RequestItem::SchemaRenameNodeProps { node, renames } => {
            schema_ops::rename_node_props(passport, &node, &renames)?;
        }
        RequestItem::SchemaRenameRelationships { renames } => {
            schema_ops::rename_relationships(passport, &renames)?;
        }
        RequestItem::SchemaRenameRelationshipProps {
            relationship,
            renames,
        } => schema_ops::rename_relationship_props(passport, &relationship, &renames)?,

        RequestItem::NodeInsert(write) => {
            let slot = write.slot.clone();
            let record = node::write_node(passport, WriteMode::Insert, write)?;
            fill_slot(passport, slot, record)?;
        }
        RequestItem::NodeUpdate(write) => {
            let slot = write.slot.clone();
            let record = node::write_node(passport, WriteMode::Update, write)?;
            fill_slot(passport, slot, record)?;
        }
        RequestItem::NodeUpsert(write) => {
            let slot = write.slot.clone();
            let record = node::write_node(passport, WriteMode::Upsert, write)?;
            fill_slot(passport, slot, record)?;
        }
        RequestItem::RelationshipInsert(write) => {
            let slot = write.slot.clone();
            let record = relationship::write_relationship(passport, WriteMode::Insert, write)?;
            fill_slot(passport, slot, record)?;
        }
        RequestItem::RelationshipUpdate(write) => {
            let slot = write.slot.clone();
            let record = relationship::write_relationship(passport, WriteMode::Update, write)?;
            fill_slot(passport, slot, record)?;
        }
        RequestItem::RelationshipUpsert(write) => {
            let slot = write.slot.clone();
            let record = relationship::write_relationship(passport, WriteMode::Upsert, write)?;
            fill_slot(passport, slot, record)?;
        }

        RequestItem::NodeQuery { node, slot, select } => {
            let (now, original) = query::run(passport, QueryTarget::Node, &node, &select)?;
            passport.set_slot(&slot, now, original);
        }
        RequestItem::RelationshipQuery {
            relationship,
            slot,
            select,
        } => {
            let (now, original) =
                query::run(passport, QueryTarget::Relationship, &relationship, &select)?;
            passport.set_slot(&slot, now, original);
        }

        RequestItem::NodeDeleteData { uids } => delete::delete_nodes(passport, &uids)?,
        RequestItem::RelationshipDeleteData { uids } => {
            delete::delete_relationships(passport, &uids)?;
        }
        RequestItem::NodePropDeleteData { uids, props } => {
            delete::delete_props(passport, delete::Target::Node, &uids, &props)?;
        }
        RequestItem::RelationshipPropDeleteData { uids, props } => {
            delete::delete_props(passport, delete::Target::Relationship, &uids, &props)?;
        }
        RequestItem::NodeDeleteDataAndDeleteFromSchema { nodes } => {
            schema_ops::drop_nodes(passport, &nodes)?;
        }
        RequestItem::RelationshipDeleteDataAndDeleteFromSchema { relationships } => {
            schema_ops::drop_relationships(passport, &relationships)?;
        }
        RequestItem::NodePropDeleteDataAndDeleteFromSchema { node, props } => {
            schema_ops::drop_node_props(passport, &node, &props)?;
        }
        RequestItem::RelationshipPropDeleteDataAndDeleteFromSchema {
            relationship,
            props,
        } => schema_ops::drop_relationship_props(passport, &relationship, &props)?,
    }
    Ok(())
}

/// Render a written record into its slot, when the item declared one.
fn fill_slot(
    passport: &mut Passport<'_>,
    slot: Option<String>,
    record: Record,
) -> Result<(), GraphError> {
    let Some(slot) = slot else {
        return Ok(());
    };
    let (now, original) = query::view(passport, record)?;
    passport.set_slot(&slot, now, original);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn schema() -> Value {
        json!({ "id": "SchemaAdd", "schema": {
            "nodes": {
                "User": {
                    "name": { "is": "prop", "dataType": "string", "mustBeDefined": true },
                    "posts": { "is": "relationshipProp", "direction": "forward",
                               "node": "Post", "relationship": "wrote" }
                },
                "Post": {
                    "title": { "is": "prop", "dataType": "string" },
                    "author": { "is": "relationshipProp", "direction": "reverse",
                                "node": "User", "relationship": "wrote" }
                }
            },
            "relationships": { "wrote": { "kind": "oneToMany" } }
        }})
    }

    fn db() -> Database<MemoryStore> {
        let mut db = Database::new(MemoryStore::new());
        db.execute_json(&schema(), None).expect("schema");
        db
    }

    #[test]
    fn oversized_envelopes_are_rejected() {
        let mut db = Database::with_options(
            MemoryStore::new(),
            EngineOptions {
                max_items_per_request: 1,
            },
        );
        let err = db
            .execute_json(&json!([{ "id": "Empty" }, { "id": "Empty" }]), None)
            .expect_err("too many");
        assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
        assert!(db.store().is_empty());
    }

    #[test]
    fn writes_fill_declared_slots() {
        let mut db = db();
        let response = db
            .execute_json(
                &json!([
                    { "id": "NodeInsert", "node": "User", "slot": "ada",
                      "props": { "uid": "_:ada", "name": "Ada" } },
                    { "id": "NodeInsert", "node": "Post", "slot": "post",
                      "props": { "uid": "_:post", "title": "Notes" } },
                    { "id": "RelationshipInsert", "relationship": "wrote",
                      "a": "_:ada", "b": "_:post" }
                ]),
                None,
            )
            .expect("insert");

        let ada = &response.manifest.new_ids["_:ada"];
        assert_eq!(response.now["ada"]["uid"], json!(ada));
        assert_eq!(response.now["ada"]["name"], json!("Ada"));
        assert_eq!(response.now["post"]["title"], json!("Notes"));
        assert!(response.manifest.deleted_keys.is_empty());
    }

    #[test]
    fn required_props_are_checked_at_the_end() {
        let mut db = db();
        let err = db
            .execute_json(
                &json!({ "id": "NodeInsert", "node": "User", "props": { "uid": "_:a" } }),
                None,
            )
            .expect_err("missing name");
        assert_eq!(err.code(), Some(ErrorCode::MissingRequiredField));

        let ok = db.execute_json(
            &json!([
                { "id": "NodeInsert", "node": "User", "props": { "uid": "_:a" } },
                { "id": "NodeUpdate", "node": "User", "props": { "uid": "_:a", "name": "Ada" } }
            ]),
            None,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn backup_round_trips_through_a_fresh_store() {
        let mut db = db();
        db.execute_json(
            &json!({ "id": "NodeInsert", "node": "User", "props": { "name": "Ada" } }),
            None,
        )
        .expect("insert");
        let backup = db
            .execute_json(&json!({ "id": "BackupGet", "slot": "backup" }), None)
            .expect("backup");

        let mut restored = Database::new(MemoryStore::new());
        restored
            .execute_json(
                &json!({ "id": "BackupLoad", "backup": backup.now["backup"] }),
                None,
            )
            .expect("load");
        let users = restored
            .execute_json(
                &json!({ "id": "NodeQuery", "node": "User", "slot": "users" }),
                None,
            )
            .expect("query");
        assert_eq!(users.now["users"][0]["name"], json!("Ada"));
    }

    #[test]
    fn empty_wipes_data_and_schema() {
        let mut db = db();
        db.execute_json(&json!({ "id": "Empty" }), None)
            .expect("empty");
        assert!(db.store().is_empty());
        let err = db
            .execute_json(
                &json!({ "id": "NodeQuery", "node": "User", "slot": "users" }),
                None,
            )
            .expect_err("schema gone");
        assert_eq!(err.code(), Some(ErrorCode::UnknownNode));
    }
}
