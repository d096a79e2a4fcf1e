//! # Error Types
//!
//! Every failure the engine raises is a structured value:
//! `{kind, code, detail, context}`.
//!
//! - `kind` follows the taxonomy (authorization, validation, reference, conflict)
//!   plus the two infrastructure kinds (storage, serialization)
//! - `code` names the precise failure
//! - `context` carries the offending names/ids
//!
//! Errors are raised synchronously and never retried internally.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

/// Extra key/value pairs attached to an error.
pub type ErrorContext = Map<String, Value>;

/// The broad class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A permission revocation blocks the action.
    Authorization,
    /// Malformed schema, naming collision, shape mismatch, missing required data.
    Validation,
    /// Unknown id, type, prop, relationship or placeholder.
    Reference,
    /// Duplicate placeholder or id within one request.
    Conflict,
    /// The backing store failed.
    Storage,
    /// A stored value could not be encoded or decoded.
    Serialization,
}

impl ErrorKind {
    /// Stable string form used in JSON renderings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::Reference => "reference",
            Self::Conflict => "conflict",
            Self::Storage => "storage",
            Self::Serialization => "serialization",
        }
    }
}

/// The precise failure behind an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    SchemaValidation,
    SchemaInvalidRelationshipAlignment,
    AuthContext,
    PermissionRevoked,
    InvalidUpdateTarget,
    MissingRequiredField,
    MissingRequiredRelationship,
    InvalidPropType,
    UnknownNode,
    UnknownRelationship,
    UnknownProp,
    UnknownId,
    UnknownPlaceholder,
    DuplicatePlaceholder,
    DuplicateId,
    MissingSigner,
    MissingPrivateKey,
    InvalidRequest,
    ReservedProp,
}

impl ErrorCode {
    /// Stable string form used in JSON renderings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaValidation => "SchemaValidationError",
            Self::SchemaInvalidRelationshipAlignment => "SchemaInvalidRelationshipAlignment",
            Self::AuthContext => "AuthContextError",
            Self::PermissionRevoked => "PermissionRevoked",
            Self::InvalidUpdateTarget => "InvalidUpdateTarget",
            Self::MissingRequiredField => "MissingRequiredField",
            Self::MissingRequiredRelationship => "MissingRequiredRelationship",
            Self::InvalidPropType => "InvalidPropType",
            Self::UnknownNode => "UnknownNode",
            Self::UnknownRelationship => "UnknownRelationship",
            Self::UnknownProp => "UnknownProp",
            Self::UnknownId => "UnknownId",
            Self::UnknownPlaceholder => "UnknownPlaceholder",
            Self::DuplicatePlaceholder => "DuplicatePlaceholder",
            Self::DuplicateId => "DuplicateId",
            Self::MissingSigner => "MissingSigner",
            Self::MissingPrivateKey => "MissingPrivateKey",
            Self::InvalidRequest => "InvalidRequest",
            Self::ReservedProp => "ReservedProp",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the Arbor engine.
///
/// - No silent failures
/// - Use `Result<T, GraphError>` for fallible operations
/// - The engine never panics; all errors are recoverable values
#[derive(Debug, Error)]
pub enum GraphError {
    /// A matching permission revocation blocks the action.
    #[error("authorization error [{code}]: {detail}")]
    Authorization {
        code: ErrorCode,
        detail: String,
        context: ErrorContext,
    },

    /// The input or the resulting state breaks a schema rule.
    #[error("validation error [{code}]: {detail}")]
    Validation {
        code: ErrorCode,
        detail: String,
        context: ErrorContext,
    },

    /// Something named by the request does not exist.
    #[error("reference error [{code}]: {detail}")]
    Reference {
        code: ErrorCode,
        detail: String,
        context: ErrorContext,
    },

    /// Two parts of one request claim the same identity.
    #[error("conflict error [{code}]: {detail}")]
    Conflict {
        code: ErrorCode,
        detail: String,
        context: ErrorContext,
    },

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Build an authorization error.
    pub fn authorization(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Authorization {
            code,
            detail: detail.into(),
            context: ErrorContext::new(),
        }
    }

    /// Build a validation error.
    pub fn validation(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Validation {
            code,
            detail: detail.into(),
            context: ErrorContext::new(),
        }
    }

    /// Build a reference error.
    pub fn reference(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Reference {
            code,
            detail: detail.into(),
            context: ErrorContext::new(),
        }
    }

    /// Build a conflict error.
    pub fn conflict(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            detail: detail.into(),
            context: ErrorContext::new(),
        }
    }

    /// Wrap a backing-store failure.
    pub fn storage(err: impl fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Attach a context entry. Infrastructure errors carry no context.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Self::Authorization { context, .. }
        | Self::Validation { context, .. }
        | Self::Reference { context, .. }
        | Self::Conflict { context, .. } = &mut self
        {
            context.insert(key.to_string(), value.into());
        }
        self
    }

    /// The broad class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Reference { .. } => ErrorKind::Reference,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// The precise code, if this is a taxonomy error.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Authorization { code, .. }
            | Self::Validation { code, .. }
            | Self::Reference { code, .. }
            | Self::Conflict { code, .. } => Some(*code),
            Self::Storage(_) | Self::Serialization(_) => None,
        }
    }

    /// The context map, if this is a taxonomy error.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Authorization { context, .. }
            | Self::Validation { context, .. }
            | Self::Reference { context, .. }
            | Self::Conflict { context, .. } => Some(context),
            Self::Storage(_) | Self::Serialization(_) => None,
        }
    }

    /// Render as `{kind, code, detail, context}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let detail = match self {
            Self::Authorization { detail, .. }
            | Self::Validation { detail, .. }
            | Self::Reference { detail, .. }
            | Self::Conflict { detail, .. }
            | Self::Storage(detail)
            | Self::Serialization(detail) => detail.clone(),
        };
        json!({
            "kind": self.kind().as_str(),
            "code": self.code().map(ErrorCode::as_str),
            "detail": detail,
            "context": self.context().cloned().unwrap_or_default(),
        })
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_attached_to_taxonomy_errors() {
        let err = GraphError::reference(ErrorCode::UnknownId, "no such id").with("id", "42");
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert_eq!(err.code(), Some(ErrorCode::UnknownId));
        assert_eq!(
            err.context().and_then(|c| c.get("id")),
            Some(&Value::from("42"))
        );
    }

    #[test]
    fn storage_errors_ignore_context() {
        let err = GraphError::storage("disk full").with("id", "1");
        assert!(err.context().is_none());
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn json_rendering_names_kind_and_code() {
        let err = GraphError::validation(ErrorCode::MissingRequiredField, "name is required")
            .with("node", "User");
        let rendered = err.to_json();
        assert_eq!(rendered["kind"], "validation");
        assert_eq!(rendered["code"], "MissingRequiredField");
        assert_eq!(rendered["context"]["node"], "User");
    }

    #[test]
    fn display_includes_code() {
        let err = GraphError::conflict(ErrorCode::DuplicatePlaceholder, "_:a used twice");
        assert_eq!(
            err.to_string(),
            "conflict error [DuplicatePlaceholder]: _:a used twice"
        );
    }
}
