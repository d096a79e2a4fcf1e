//! # Engine Primitives
//!
//! Hardcoded constants for the Arbor engine.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Every reserved backing-store key is built from the constants here so the
//! key layout lives in exactly one place.
//!
//! ## Key Layout
//!
//! | Key | Value |
//! |---|---|
//! | `$schema` | schema document |
//! | `$setting___enforcePermissions` | bool |
//! | `$meta___nextId` | id counter |
//! | `$index___<name>` | type index (array of ids) |
//! | `$index_unique___<name>___<prop>___<value>` | id |
//! | `$index_sort___<name>___<prop>` | ordered array of ids |
//! | `<id>` | a stored record |

/// Separator between the segments of a reserved key.
///
/// Schema names may never contain it.
pub const DELIMITER: &str = "___";

/// Every reserved key starts with this marker; minted ids never do.
pub const RESERVED_KEY_MARKER: char = '$';

/// Key holding the persisted schema document.
pub const SCHEMA_KEY: &str = "$schema";

/// Key holding the boolean "enforce permissions" setting.
///
/// Absent or `false` means permissions are not enforced.
pub const ENFORCE_PERMISSIONS_KEY: &str = "$setting___enforcePermissions";

/// Key holding the id counter.
pub const NEXT_ID_KEY: &str = "$meta___nextId";

/// Prefix of every type index key.
pub const TYPE_INDEX_PREFIX: &str = "$index___";

/// Prefix of every unique index key.
pub const UNIQUE_INDEX_PREFIX: &str = "$index_unique___";

/// Prefix of every sort index key.
pub const SORT_INDEX_PREFIX: &str = "$index_sort___";

/// Prefix marking a caller-chosen placeholder id (`_:alice`).
pub const PLACEHOLDER_PREFIX: &str = "_:";

/// Marker every relationship prop name must start with.
pub const RELATIONSHIP_PROP_MARKER: char = '_';

/// Reserved prop carrying a node id.
pub const NODE_UID_PROP: &str = "uid";

/// Reserved prop carrying a relationship id.
pub const RELATIONSHIP_UID_PROP: &str = "_uid";

/// Wildcard prop name in a permission revocation.
pub const WILDCARD: &str = "*";

/// Default ceiling on request items per envelope.
pub const DEFAULT_MAX_ITEMS_PER_REQUEST: usize = 1000;

// =============================================================================
// KEY BUILDERS
// =============================================================================

/// Type index key for a node or relationship type.
#[must_use]
pub fn type_index_key(name: &str) -> String {
    format!("{TYPE_INDEX_PREFIX}{name}")
}

/// Unique index key for `(name, prop, value)`.
///
/// Strings are keyed by their raw text, every other value by its JSON form.
#[must_use]
pub fn unique_index_key(name: &str, prop: &str, value: &serde_json::Value) -> String {
    let rendered = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("{UNIQUE_INDEX_PREFIX}{name}{DELIMITER}{prop}{DELIMITER}{rendered}")
}

/// Prefix shared by every unique index key of `(name, prop)`.
#[must_use]
pub fn unique_index_prefix(name: &str, prop: &str) -> String {
    format!("{UNIQUE_INDEX_PREFIX}{name}{DELIMITER}{prop}{DELIMITER}")
}

/// Prefix shared by every unique index key of `name`.
#[must_use]
pub fn unique_index_type_prefix(name: &str) -> String {
    format!("{UNIQUE_INDEX_PREFIX}{name}{DELIMITER}")
}

/// Sort index key for `(name, prop)`.
#[must_use]
pub fn sort_index_key(name: &str, prop: &str) -> String {
    format!("{SORT_INDEX_PREFIX}{name}{DELIMITER}{prop}")
}

/// Check whether an id is a caller-chosen placeholder.
#[must_use]
pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}
