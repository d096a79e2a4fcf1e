//! # arbor-core
//!
//! An embeddable, schema-driven graph database engine over an ordered
//! key-value store.
//!
//! A caller declares node types, relationship types and permissions in a
//! schema document, then sends request envelopes: ordered lists of tagged
//! items that insert, update, query and delete graph data. The engine
//! validates every write against the schema, maintains type, unique and
//! sort indices, and answers queries with a permission-filtered `now` view
//! alongside a complete `original` view.
//!
//! ## Layers
//!
//! - `storage`: the [`KvStore`] contract, in-memory and redb stores
//! - `cache`: per-request read-through, write-buffering view
//! - `schema`: document types, validation, derived index
//! - `passport`: per-request identity, permissions and response slots
//! - `mutation` / `query`: the write and read engines
//! - `database`: the orchestrator tying one request together
//!
//! ## Constraints
//!
//! - Deterministic: ordered maps everywhere, no hidden randomness
//! - Synchronous and single-actor per store
//! - No rollback: writes issued before a failure stay in place
//! - No cryptography: `hash` props go through an injected [`Signer`]

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod database;
pub mod mutation;
pub mod passport;
pub mod primitives;
pub mod query;
pub mod request;
pub mod response;
pub mod schema;
pub mod security;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ErrorCode, ErrorContext, ErrorKind, GraphError, NodeRecord, Props, Record, RelationshipRecord,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use cache::Cache;
pub use database::{Database, EngineOptions};
pub use passport::{Action, Identity, Passport, Scope};
pub use request::{NodeWrite, RelationshipWrite, Rename, RequestItem, WriteOptions};
pub use response::{Manifest, Response};
pub use security::Signer;
pub use storage::{KvStore, ListOptions, MemoryStore, RedbStore};

// =============================================================================
// RE-EXPORTS: Schema and Query
// =============================================================================

pub use query::{Filter, QueryOptions, Selection};
pub use schema::{
    Cardinality, DataType, Direction, PropDef, RelationshipPropDef, RelationshipType, Schema,
    SchemaSnapshot, ValuePropDef, access_control_schema,
};
