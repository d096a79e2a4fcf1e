//! # Configuration
//!
//! `arbor.toml`, every section optional:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! path = "arbor.db"
//!
//! [engine]
//! max_items_per_request = 1000
//! enforce_permissions = true
//! ```
//!
//! CLI flags override file values.

use arbor_core::primitives::DEFAULT_MAX_ITEMS_PER_REQUEST;
use arbor_core::{EngineOptions, GraphError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File read when no `--config` is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "arbor.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG SECTIONS
// =============================================================================

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArborConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// redb database file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("arbor.db"),
        }
    }
}

/// `[engine]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_items_per_request: usize,
    /// Written to the settings record at startup when present.
    /// Absent leaves the stored setting alone.
    pub enforce_permissions: Option<bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_items_per_request: DEFAULT_MAX_ITEMS_PER_REQUEST,
            enforce_permissions: None,
        }
    }
}

impl EngineConfig {
    /// Engine options derived from this section.
    #[must_use]
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            max_items_per_request: self.max_items_per_request,
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl ArborConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text)
            .map_err(|e| GraphError::Serialization(format!("Invalid configuration: {}", e)))
    }

    /// Load configuration.
    ///
    /// - `Some(path)`: the file must exist
    /// - `None`: reads [`DEFAULT_CONFIG_FILE`] if present, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, GraphError> {
        let path = match path {
            Some(path) => path,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            GraphError::storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(GraphError::Serialization(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ArborConfig::from_toml_str("").expect("parse");
        assert_eq!(config, ArborConfig::default());
        assert_eq!(config.server.addr(), "127.0.0.1:8080");
        assert_eq!(config.engine.options(), EngineOptions::default());
        assert_eq!(config.engine.enforce_permissions, None);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = ArborConfig::from_toml_str(
            r#"
            [server]
            port = 9000

            [engine]
            enforce_permissions = true
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.path, PathBuf::from("arbor.db"));
        assert_eq!(
            config.engine.max_items_per_request,
            DEFAULT_MAX_ITEMS_PER_REQUEST
        );
        assert_eq!(config.engine.enforce_permissions, Some(true));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ArborConfig::from_toml_str("[server]\nhots = \"0.0.0.0\"\n")
            .expect_err("typo must fail");
        assert!(matches!(err, GraphError::Serialization(_)));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(ArborConfig::load(Some(&missing)).is_err());

        let present = dir.path().join("arbor.toml");
        std::fs::write(&present, "[storage]\npath = \"data/graph.db\"\n").expect("write");
        let config = ArborConfig::load(Some(&present)).expect("load");
        assert_eq!(config.storage.path, PathBuf::from("data/graph.db"));
    }
}
