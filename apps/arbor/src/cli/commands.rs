//! # CLI Command Implementations

use crate::api::{self, AppState, SharedStore};
use crate::config::ArborConfig;
use arbor_core::{
    Database, ErrorCode, GraphError, RedbStore, RequestItem, Response, access_control_schema,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a request envelope file (100 MB).
const MAX_REQUEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a backup file (500 MB).
const MAX_BACKUP_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Slot the backup commands read and write.
const BACKUP_SLOT: &str = "backup";

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::storage(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(GraphError::validation(
            ErrorCode::InvalidRequest,
            format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                max_size
            ),
        ));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        GraphError::storage(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GraphError::storage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, GraphError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        GraphError::storage(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(GraphError::storage(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| GraphError::storage("Output path has no filename"))?;

    Ok(canonical_parent.join(filename))
}

/// Read and parse a JSON input file.
fn read_json_file(path: &Path, max_size: u64) -> Result<Value, GraphError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    let contents = std::fs::read(&validated)
        .map_err(|e| GraphError::storage(format!("Read file: {}", e)))?;
    Ok(serde_json::from_slice(&contents)?)
}

// =============================================================================
// DATABASE HELPERS
// =============================================================================

/// Open the configured redb database.
pub fn open_database(config: &ArborConfig) -> Result<Database<RedbStore>, GraphError> {
    let store = RedbStore::open(&config.storage.path)?;
    Ok(Database::with_options(store, config.engine.options()))
}

fn print_response(response: &Response) -> Result<(), GraphError> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &ArborConfig) -> Result<(), GraphError> {
    let store: SharedStore = Box::new(RedbStore::open(&config.storage.path)?);
    let mut db = Database::with_options(store, config.engine.options());
    if let Some(enforce) = config.engine.enforce_permissions {
        db.set_enforce_permissions(enforce)?;
    }

    println!("Arbor Graph Database Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {}", config.server.host);
    println!("  Port:      {}", config.server.port);
    println!("  Database:  {}", config.storage.path.display());
    println!("  Max items: {}", config.engine.max_items_per_request);
    println!();
    println!("Endpoints:");
    println!("  POST /request - Run a request envelope");
    println!("  GET  /health  - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.server.addr(), AppState::new(db)).await
}

// =============================================================================
// EXEC COMMAND
// =============================================================================

/// Run a request envelope from a file and print the response.
pub fn cmd_exec(config: &ArborConfig, file: &Path, token: Option<&str>) -> Result<(), GraphError> {
    tracing::info!("Executing request from {:?}", file);
    let request = read_json_file(file, MAX_REQUEST_FILE_SIZE)?;
    let mut db = open_database(config)?;
    let response = db.execute_json(&request, token)?;
    print_response(&response)
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(
    config: &ArborConfig,
    force: bool,
    access_control: bool,
    enforce: bool,
) -> Result<(), GraphError> {
    let path = &config.storage.path;
    if path.exists() {
        if !force {
            return Err(GraphError::storage(format!(
                "Database already exists at {:?}. Use --force to overwrite.",
                path
            )));
        }
        std::fs::remove_file(path)
            .map_err(|e| GraphError::storage(format!("Remove existing database: {}", e)))?;
    }

    let mut db = open_database(config)?;
    if access_control {
        let schema = serde_json::to_value(access_control_schema())?;
        db.execute(vec![RequestItem::SchemaAdd { schema, slot: None }], None)?;
    }
    if enforce {
        db.set_enforce_permissions(true)?;
    }

    println!("Initialized new database at {:?}", path);
    if access_control {
        println!("  Access-control schema installed (User, Role, Revocation)");
    }
    println!(
        "  Permission enforcement: {}",
        if enforce { "on" } else { "off" }
    );
    Ok(())
}

// =============================================================================
// BACKUP / RESTORE COMMANDS
// =============================================================================

/// Write every stored key to a JSON file.
pub fn cmd_backup(
    config: &ArborConfig,
    output: &Path,
    token: Option<&str>,
) -> Result<(), GraphError> {
    let output = validate_output_path(output)?;
    let mut db = open_database(config)?;
    let response = db.execute(
        vec![RequestItem::BackupGet {
            slot: BACKUP_SLOT.to_string(),
        }],
        token,
    )?;
    let backup = response.slot(BACKUP_SLOT).cloned().unwrap_or_default();
    let keys = backup.as_object().map_or(0, Map::len);

    let text = serde_json::to_string_pretty(&backup)?;
    std::fs::write(&output, text)
        .map_err(|e| GraphError::storage(format!("Write backup: {}", e)))?;

    println!("Backed up {} keys to {:?}", keys, output);
    Ok(())
}

/// Load a backup file, wiping existing data unless told otherwise.
pub fn cmd_restore(
    config: &ArborConfig,
    input: &Path,
    keep_existing: bool,
    token: Option<&str>,
) -> Result<(), GraphError> {
    let Value::Object(backup) = read_json_file(input, MAX_BACKUP_FILE_SIZE)? else {
        return Err(GraphError::validation(
            ErrorCode::InvalidRequest,
            "A backup file must hold a JSON object of key -> value",
        ));
    };
    let keys = backup.len();

    let mut db = open_database(config)?;
    db.execute(
        vec![RequestItem::BackupLoad {
            backup,
            skip_data_delete: keep_existing,
        }],
        token,
    )?;

    println!("Restored {} keys from {:?}", keys, input);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_in(dir: &Path) -> ArborConfig {
        let mut config = ArborConfig::default();
        config.storage.path = dir.join("arbor.db");
        config
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        cmd_init(&config, false, false, false).expect("first init");
        assert!(cmd_init(&config, false, false, false).is_err());
        cmd_init(&config, true, false, false).expect("forced init");
    }

    #[test]
    fn init_installs_access_control_and_enforcement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        cmd_init(&config, false, true, true).expect("init");

        let mut db = open_database(&config).expect("open");
        let err = db
            .execute_json(&json!({ "id": "SchemaGet", "slot": "schema" }), None)
            .expect_err("enforcement needs a caller");
        assert_eq!(err.code(), Some(ErrorCode::AuthContext));
    }

    #[test]
    fn backup_then_restore_into_a_fresh_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        {
            let mut db = open_database(&config).expect("open");
            db.execute_json(
                &json!([
                    { "id": "SchemaAdd", "schema": { "nodes": { "Tag": {
                        "label": { "is": "prop", "dataType": "string" }
                    }}}},
                    { "id": "NodeInsert", "node": "Tag", "props": { "label": "rust" } }
                ]),
                None,
            )
            .expect("seed");
        }

        let backup = dir.path().join("backup.json");
        cmd_backup(&config, &backup, None).expect("backup");

        let mut restored = config.clone();
        restored.storage.path = dir.path().join("restored.db");
        cmd_restore(&restored, &backup, false, None).expect("restore");

        let mut db = open_database(&restored).expect("open");
        let response = db
            .execute_json(&json!({ "id": "NodeQuery", "node": "Tag", "slot": "tags" }), None)
            .expect("query");
        assert_eq!(response.now["tags"][0]["label"], json!("rust"));
    }

    #[test]
    fn restore_rejects_non_object_backups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let input = dir.path().join("bad.json");
        std::fs::write(&input, "[1, 2, 3]").expect("write");
        let err = cmd_restore(&config, &input, false, None).expect_err("array");
        assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    }

    #[test]
    fn exec_rejects_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let missing = dir.path().join("nope.json");
        assert!(cmd_exec(&config, &missing, None).is_err());
    }
}
