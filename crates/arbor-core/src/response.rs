//! # Response
//!
//! What a request hands back: the externally visible `now` slots, the
//! complete `original` slots, and a manifest of what the request minted and
//! removed.

use crate::passport::Passport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Result of one executed request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Slots filtered through read permissions and selections.
    pub now: Map<String, Value>,
    /// Slots with every prop the engine touched.
    pub original: Map<String, Value>,
    pub manifest: Manifest,
}

/// Side effects of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Placeholder -> minted id.
    pub new_ids: BTreeMap<String, String>,
    /// Every key the request removed, in key order.
    pub deleted_keys: Vec<String>,
}

impl Response {
    /// Collect the finished passport into a response.
    pub(crate) fn collect(passport: Passport<'_>) -> Self {
        let deleted_keys = passport.cache.deleted_keys().cloned().collect();
        Self {
            now: passport.now,
            original: passport.original,
            manifest: Manifest {
                new_ids: passport.new_ids,
                deleted_keys,
            },
        }
    }

    /// A visible slot, or `None`.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Value> {
        self.now.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_serializes_camel_case() {
        let mut response = Response::default();
        response
            .manifest
            .new_ids
            .insert("_:a".into(), "1".into());
        response.manifest.deleted_keys.push("7".into());
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["manifest"]["newIds"]["_:a"], json!("1"));
        assert_eq!(value["manifest"]["deletedKeys"], json!(["7"]));
    }
}
