//! # Request Context ("passport")
//!
//! Everything one request runs against, built once when it arrives:
//!
//! - the request's [`Cache`]
//! - the current [`SchemaSnapshot`] (schema + derived index)
//! - the caller's identity, resolved from a bearer token
//! - the caller's permission revocations, keyed by `(action, scope, prop)`
//!
//! When the `$setting___enforcePermissions` record is absent or `false`,
//! identity resolution is skipped and every check passes.
//!
//! The passport also carries the request's bookkeeping: minted ids, staged
//! records for the required-field pass, pending sort-index rebuilds and the
//! response slots filled so far.

use crate::cache::Cache;
use crate::primitives::{
    ENFORCE_PERMISSIONS_KEY, NODE_UID_PROP, RELATIONSHIP_UID_PROP, SCHEMA_KEY, WILDCARD,
    unique_index_key,
};
use crate::schema::access::{ROLE_NODE, ROLE_REVOKES, TOKEN_PROP, USER_HAS_ROLE, USER_NODE};
use crate::schema::{Schema, SchemaSnapshot};
use crate::security::Signer;
use crate::types::{ErrorCode, GraphError, NodeRecord, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// PERMISSION MODEL
// =============================================================================

/// An action a revocation can deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Read,
    Insert,
    Update,
    Upsert,
    Delete,
    /// Insert-or-update: checked alongside every insert, update and upsert.
    Inup,
}

impl Action {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Inup => "inup",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "upsert" => Some(Self::Upsert),
            "delete" => Some(Self::Delete),
            "inup" => Some(Self::Inup),
            _ => None,
        }
    }

    /// Actions a write of this kind is checked against.
    fn write_set(self) -> &'static [Self] {
        match self {
            Self::Insert => &[Self::Insert, Self::Inup],
            Self::Update => &[Self::Update, Self::Inup],
            Self::Upsert => &[Self::Upsert, Self::Inup],
            Self::Read => &[Self::Read],
            Self::Delete => &[Self::Delete],
            Self::Inup => &[Self::Inup],
        }
    }
}

/// What a revocation applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Schema,
    Node(String),
    Relationship(String),
}

impl Scope {
    /// Scope of a stored record.
    #[must_use]
    pub fn of(record: &Record) -> Self {
        match record {
            Record::Node(n) => Self::Node(n.node.clone()),
            Record::Relationship(r) => Self::Relationship(r.relationship.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Schema => "schema".to_string(),
            Self::Node(name) | Self::Relationship(name) => name.clone(),
        }
    }
}

/// Revocations keyed by `(action, scope, prop-or-*)`.
///
/// The value is the row-level escape: `Some(prop)` lets the caller through
/// when they own the record via `prop`; `None` denies outright.
#[derive(Debug, Clone, Default)]
pub struct Revocations {
    entries: BTreeMap<(Action, Scope, String), Option<String>>,
}

impl Revocations {
    /// Add a revocation. An outright denial is never weakened by a later escape.
    pub fn insert(&mut self, action: Action, scope: Scope, prop: &str, allow: Option<String>) {
        let key = (action, scope, prop.to_string());
        match self.entries.get(&key) {
            Some(None) => {}
            Some(Some(_)) if allow.is_some() => {}
            _ => {
                self.entries.insert(key, allow);
            }
        }
    }

    /// Look up a revocation.
    #[must_use]
    pub fn get(&self, action: Action, scope: &Scope, prop: &str) -> Option<&Option<String>> {
        self.entries.get(&(action, scope.clone(), prop.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The caller's `User` node id.
    pub uid: String,
    /// The caller's `Role` node id.
    pub role: String,
}

// =============================================================================
// PASSPORT
// =============================================================================

/// Per-request context.
pub struct Passport<'s> {
    pub cache: Cache<'s>,
    pub snapshot: Arc<SchemaSnapshot>,
    pub signer: Option<Arc<dyn Signer>>,
    identity: Option<Identity>,
    revocations: Revocations,
    enforce: bool,
    /// Placeholder -> minted id.
    pub new_ids: BTreeMap<String, String>,
    /// Records written this request, checked by the required-field pass.
    pub staged: BTreeSet<String>,
    /// `(type, prop)` sort indices awaiting a rebuild.
    pub sort_pending: BTreeSet<(String, String)>,
    /// Externally visible response slots.
    pub now: Map<String, Value>,
    /// Full response slots.
    pub original: Map<String, Value>,
}

impl std::fmt::Debug for Passport<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passport")
            .field("identity", &self.identity)
            .field("revocations", &self.revocations.len())
            .field("enforce", &self.enforce)
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

impl<'s> Passport<'s> {
    /// Build the context for one request.
    ///
    /// `snapshot` is reused when supplied, otherwise loaded from the store.
    pub fn build(
        cache: Cache<'s>,
        token: Option<&str>,
        snapshot: Option<Arc<SchemaSnapshot>>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, GraphError> {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => Arc::new(load_snapshot(&cache)?),
        };
        let enforce = matches!(cache.one(ENFORCE_PERMISSIONS_KEY)?, Some(Value::Bool(true)));

        let mut passport = Self {
            cache,
            snapshot,
            signer,
            identity: None,
            revocations: Revocations::default(),
            enforce,
            new_ids: BTreeMap::new(),
            staged: BTreeSet::new(),
            sort_pending: BTreeSet::new(),
            now: Map::new(),
            original: Map::new(),
        };

        if enforce {
            let (identity, revocations) = passport.resolve_identity(token)?;
            tracing::debug!(
                user = %identity.uid,
                role = %identity.role,
                revocations = revocations.len(),
                "resolved caller identity"
            );
            passport.identity = Some(identity);
            passport.revocations = revocations;
        }

        Ok(passport)
    }

    /// Whether permissions are enforced for this request.
    #[must_use]
    pub fn enforces(&self) -> bool {
        self.enforce
    }

    /// The resolved caller, when permissions are enforced.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Current schema document.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.snapshot.schema
    }

    /// Validate, persist and swap in a new schema.
    pub fn replace_schema(&mut self, schema: Schema) -> Result<(), GraphError> {
        let snapshot = SchemaSnapshot::new(schema)?;
        let document = serde_json::to_value(&snapshot.schema)?;
        self.cache.put(SCHEMA_KEY, document)?;
        self.snapshot = Arc::new(snapshot);
        tracing::info!(
            nodes = self.snapshot.index.node_names.len(),
            relationships = self.snapshot.index.relationship_names.len(),
            "schema replaced"
        );
        Ok(())
    }

    /// Reload the schema from the store (after a restore or wipe).
    pub fn reload_schema(&mut self) -> Result<(), GraphError> {
        self.snapshot = Arc::new(load_snapshot(&self.cache)?);
        Ok(())
    }

    /// Fill a response slot.
    pub fn set_slot(&mut self, slot: &str, now: Value, original: Value) {
        self.now.insert(slot.to_string(), now);
        self.original.insert(slot.to_string(), original);
    }

    /// Resolve a `slot.path` pointer into the full response built so far.
    #[must_use]
    pub fn response_value(&self, pointer: &str) -> Option<&Value> {
        let mut segments = pointer.split('.');
        let mut current = self.original.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    // =========================================================================
    // PERMISSION CHECKS
    // =========================================================================

    /// Check a schema-scoped action.
    pub fn check_schema(&self, action: Action) -> Result<(), GraphError> {
        self.check_entry(action, &Scope::Schema, WILDCARD, None)
    }

    /// Check a write against the type wildcard and each touched prop.
    ///
    /// Writes are checked against their own action plus `inup`; both the
    /// type-level and the prop-level revocation are consulted.
    pub fn check_write<'p>(
        &self,
        action: Action,
        scope: &Scope,
        props: impl IntoIterator<Item = &'p str> + Clone,
        record: Option<&Record>,
    ) -> Result<(), GraphError> {
        for &action in action.write_set() {
            self.check_entry(action, scope, WILDCARD, record)?;
            for prop in props.clone() {
                self.check_entry(action, scope, prop, record)?;
            }
        }
        Ok(())
    }

    /// Type-level read gate.
    ///
    /// Fails on an outright denial. Returns the row-level allow prop, if any,
    /// that every returned record must pass.
    pub fn read_gate(&self, scope: &Scope) -> Result<Option<String>, GraphError> {
        match self.revocations.get(Action::Read, scope, WILDCARD) {
            None => Ok(None),
            Some(Some(allow)) => Ok(Some(allow.clone())),
            Some(None) => Err(revoked(Action::Read, scope, WILDCARD)),
        }
    }

    /// Whether a prop is visible to the caller on `record`.
    pub fn can_read_prop(
        &self,
        scope: &Scope,
        prop: &str,
        record: &Record,
    ) -> Result<bool, GraphError> {
        match self.revocations.get(Action::Read, scope, prop) {
            None => Ok(true),
            Some(None) => Ok(false),
            Some(Some(allow)) => self.owns(record, allow),
        }
    }

    fn check_entry(
        &self,
        action: Action,
        scope: &Scope,
        prop: &str,
        record: Option<&Record>,
    ) -> Result<(), GraphError> {
        let allowed = match self.revocations.get(action, scope, prop) {
            None => true,
            Some(None) => false,
            Some(Some(allow)) => match record {
                Some(record) => self.owns(record, allow)?,
                None => false,
            },
        };
        if allowed {
            Ok(())
        } else {
            Err(revoked(action, scope, prop))
        }
    }

    /// Row ownership: the caller's id equals the record's value at `allow`.
    ///
    /// `uid`/`_uid` match the record itself; a relationship prop matches when
    /// the caller sits on the other end of one of its edges.
    pub fn owns(&self, record: &Record, allow: &str) -> Result<bool, GraphError> {
        let Some(identity) = &self.identity else {
            return Ok(false);
        };
        if allow == NODE_UID_PROP || allow == RELATIONSHIP_UID_PROP {
            return Ok(record.uid() == identity.uid);
        }
        if let Some(Value::String(owner)) = record.props().get(allow) {
            return Ok(*owner == identity.uid);
        }
        match record {
            Record::Relationship(rel) => Ok(match allow {
                "a" => rel.a == identity.uid,
                "b" => rel.b == identity.uid,
                _ => false,
            }),
            Record::Node(node) => {
                let Some(def) = self.schema().relationship_prop(&node.node, allow) else {
                    return Ok(false);
                };
                for rel_uid in node.adjacency.get(&def.relationship).into_iter().flatten() {
                    if let Some(rel) = self.cache.relationship(rel_uid)?
                        && rel.other_endpoint(&node.uid) == Some(identity.uid.as_str())
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    // =========================================================================
    // IDENTITY RESOLUTION
    // =========================================================================

    /// token -> User (unique index) -> Role -> Revocations.
    fn resolve_identity(
        &self,
        token: Option<&str>,
    ) -> Result<(Identity, Revocations), GraphError> {
        let token = token
            .ok_or_else(|| auth_context("permissions are enforced but no token was supplied"))?;
        let key = unique_index_key(USER_NODE, TOKEN_PROP, &Value::String(token.to_string()));
        let user_uid = match self.cache.one(&key)? {
            Some(Value::String(uid)) => uid,
            _ => return Err(auth_context("token does not resolve to a user")),
        };
        let user = self
            .cache
            .node(&user_uid)?
            .filter(|n| n.node == USER_NODE)
            .ok_or_else(|| auth_context("token does not resolve to a user"))?;

        let role = self
            .neighbours(&user, USER_HAS_ROLE, false)?
            .into_iter()
            .find(|n| n.node == ROLE_NODE)
            .ok_or_else(|| auth_context("user has no role").with("user", user.uid.as_str()))?;

        let mut revocations = Revocations::default();
        for revocation in self.neighbours(&role, ROLE_REVOKES, true)? {
            parse_revocation(&revocation, &mut revocations);
        }
        Ok((
            Identity {
                uid: user.uid,
                role: role.uid,
            },
            revocations,
        ))
    }

    /// Nodes across `relationship` edges where `node` is endpoint `a` (or `b`).
    fn neighbours(
        &self,
        node: &NodeRecord,
        relationship: &str,
        node_is_a: bool,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let mut found = Vec::new();
        for rel_uid in node.adjacency.get(relationship).into_iter().flatten() {
            let Some(rel) = self.cache.relationship(rel_uid)? else {
                continue;
            };
            let other = if node_is_a && rel.a == node.uid {
                &rel.b
            } else if !node_is_a && rel.b == node.uid {
                &rel.a
            } else {
                continue;
            };
            if let Some(other) = self.cache.node(other)? {
                found.push(other);
            }
        }
        Ok(found)
    }
}

/// Load and validate the persisted schema; absent means empty.
pub fn load_snapshot(cache: &Cache<'_>) -> Result<SchemaSnapshot, GraphError> {
    match cache.one(SCHEMA_KEY)? {
        Some(value) => SchemaSnapshot::new(Schema::from_value(value)?),
        None => Ok(SchemaSnapshot::default()),
    }
}

fn parse_revocation(node: &NodeRecord, revocations: &mut Revocations) {
    let text = |prop: &str| node.props.get(prop).and_then(Value::as_str);

    let Some(action) = text("action").and_then(Action::parse) else {
        tracing::warn!(uid = %node.uid, "revocation without a known action ignored");
        return;
    };
    let scope = if matches!(node.props.get("schema"), Some(Value::Bool(true))) {
        Scope::Schema
    } else if let Some(name) = text("nodeName") {
        Scope::Node(name.to_string())
    } else if let Some(name) = text("relationshipName") {
        Scope::Relationship(name.to_string())
    } else {
        tracing::warn!(uid = %node.uid, "revocation without a scope ignored");
        return;
    };
    let prop = text("propName").unwrap_or(WILDCARD);
    let allow = text("allowPropName").map(str::to_string);
    revocations.insert(action, scope, prop, allow);
}

fn auth_context(detail: &str) -> GraphError {
    GraphError::authorization(ErrorCode::AuthContext, detail)
}

fn revoked(action: Action, scope: &Scope, prop: &str) -> GraphError {
    GraphError::authorization(
        ErrorCode::PermissionRevoked,
        format!(
            "{} on {} ({prop}) is revoked for this caller",
            action.as_str(),
            scope.describe()
        ),
    )
    .with("action", action.as_str())
    .with("scope", scope.describe())
    .with("prop", prop)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KvStore, MemoryStore};
    use serde_json::json;

    #[test]
    fn outright_denial_is_never_weakened() {
        let mut revocations = Revocations::default();
        let scope = Scope::Node("User".into());
        revocations.insert(Action::Read, scope.clone(), "email", None);
        revocations.insert(Action::Read, scope.clone(), "email", Some("uid".into()));
        assert_eq!(revocations.get(Action::Read, &scope, "email"), Some(&None));
    }

    #[test]
    fn unenforced_passport_skips_identity() {
        let mut store = MemoryStore::new();
        let passport = Passport::build(Cache::new(&mut store), None, None, None).expect("build");
        assert!(!passport.enforces());
        assert!(passport.identity().is_none());
        passport.check_schema(Action::Insert).expect("allowed");
    }

    #[test]
    fn enforced_passport_needs_a_token() {
        let mut store = MemoryStore::new();
        store.put(ENFORCE_PERMISSIONS_KEY, json!(true)).expect("put");
        let err =
            Passport::build(Cache::new(&mut store), None, None, None).expect_err("no token");
        assert_eq!(err.code(), Some(ErrorCode::AuthContext));
    }

    #[test]
    fn response_pointers_walk_objects_and_arrays() {
        let mut store = MemoryStore::new();
        let mut passport =
            Passport::build(Cache::new(&mut store), None, None, None).expect("build");
        passport.set_slot("users", json!([]), json!([{ "uid": "1" }, { "uid": "2" }]));
        assert_eq!(passport.response_value("users.1.uid"), Some(&json!("2")));
        assert_eq!(passport.response_value("users.9.uid"), None);
        assert_eq!(passport.response_value("nobody"), None);
    }
}
