//! # Request Items
//!
//! The closed set of operations a request envelope may carry, tagged by `id`.
//! The orchestrator dispatches over [`RequestItem`] with an exhaustive match.

use crate::query::Selection;
use crate::types::{GraphError, Props};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One `{nowName, newName}` pair of a rename operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rename {
    pub now_name: String,
    pub new_name: String,
}

/// Per-write options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    /// Key reference handed to the signer for `hash` props.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// A node insert, update or upsert. The id travels in `props.uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeWrite {
    pub node: String,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub options: WriteOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

/// A relationship insert, update or upsert. The id travels in `props._uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipWrite {
    pub relationship: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<String>,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub options: WriteOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

/// Every operation a request can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all_fields = "camelCase")]
pub enum RequestItem {
    /// Wipe every key.
    Empty,
    BackupGet {
        slot: String,
    },
    BackupLoad {
        backup: Map<String, Value>,
        #[serde(default)]
        skip_data_delete: bool,
    },

    SchemaGet {
        slot: String,
    },
    SchemaAdd {
        schema: Value,
        #[serde(default)]
        slot: Option<String>,
    },
    SchemaRenameNodes {
        renames: Vec<Rename>,
    },
    SchemaRenameNodeProps {
        node: String,
        renames: Vec<Rename>,
    },
    SchemaRenameRelationships {
        renames: Vec<Rename>,
    },
    SchemaRenameRelationshipProps {
        relationship: String,
        renames: Vec<Rename>,
    },

    NodeInsert(NodeWrite),
    NodeUpdate(NodeWrite),
    NodeUpsert(NodeWrite),
    RelationshipInsert(RelationshipWrite),
    RelationshipUpdate(RelationshipWrite),
    RelationshipUpsert(RelationshipWrite),

    NodeQuery {
        node: String,
        slot: String,
        #[serde(default)]
        select: Selection,
    },
    RelationshipQuery {
        relationship: String,
        slot: String,
        #[serde(default)]
        select: Selection,
    },

    NodeDeleteData {
        uids: Vec<String>,
    },
    RelationshipDeleteData {
        uids: Vec<String>,
    },
    NodePropDeleteData {
        uids: Vec<String>,
        props: Vec<String>,
    },
    RelationshipPropDeleteData {
        uids: Vec<String>,
        props: Vec<String>,
    },
    NodeDeleteDataAndDeleteFromSchema {
        nodes: Vec<String>,
    },
    RelationshipDeleteDataAndDeleteFromSchema {
        relationships: Vec<String>,
    },
    NodePropDeleteDataAndDeleteFromSchema {
        node: String,
        props: Vec<String>,
    },
    RelationshipPropDeleteDataAndDeleteFromSchema {
        relationship: String,
        props: Vec<String>,
    },
}

impl RequestItem {
    /// The `id` tag, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::BackupGet { .. } => "BackupGet",
            Self::BackupLoad { .. } => "BackupLoad",
            Self::SchemaGet { .. } => "SchemaGet",
            Self::SchemaAdd { .. } => "SchemaAdd",
            Self::SchemaRenameNodes { .. } => "SchemaRenameNodes",
            Self::SchemaRenameNodeProps { .. } => "SchemaRenameNodeProps",
            Self::SchemaRenameRelationships { .. } => "SchemaRenameRelationships",
            Self::SchemaRenameRelationshipProps { .. } => "SchemaRenameRelationshipProps",
            Self::NodeInsert(_) => "NodeInsert",
            Self::NodeUpdate(_) => "NodeUpdate",
            Self::NodeUpsert(_) => "NodeUpsert",
            Self::RelationshipInsert(_) => "RelationshipInsert",
            Self::RelationshipUpdate(_) => "RelationshipUpdate",
            Self::RelationshipUpsert(_) => "RelationshipUpsert",
            Self::NodeQuery { .. } => "NodeQuery",
            Self::RelationshipQuery { .. } => "RelationshipQuery",
            Self::NodeDeleteData { .. } => "NodeDeleteData",
            Self::RelationshipDeleteData { .. } => "RelationshipDeleteData",
            Self::NodePropDeleteData { .. } => "NodePropDeleteData",
            Self::RelationshipPropDeleteData { .. } => "RelationshipPropDeleteData",
            Self::NodeDeleteDataAndDeleteFromSchema { .. } => "NodeDeleteDataAndDeleteFromSchema",
            Self::RelationshipDeleteDataAndDeleteFromSchema { .. } => {
                "RelationshipDeleteDataAndDeleteFromSchema"
            }
            Self::NodePropDeleteDataAndDeleteFromSchema { .. } => {
                "NodePropDeleteDataAndDeleteFromSchema"
            }
            Self::RelationshipPropDeleteDataAndDeleteFromSchema { .. } => {
                "RelationshipPropDeleteDataAndDeleteFromSchema"
            }
        }
    }

    /// Decode one item or an array of items.
    pub fn parse_many(value: &Value) -> Result<Vec<Self>, GraphError> {
        let decoded = match value {
            Value::Array(_) => serde_json::from_value(value.clone()),
            _ => serde_json::from_value(value.clone()).map(|item| vec![item]),
        };
        decoded.map_err(|e| {
            GraphError::validation(crate::types::ErrorCode::InvalidRequest, e.to_string())
        })
    }
}
