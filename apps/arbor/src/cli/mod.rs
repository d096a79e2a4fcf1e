//! # Arbor CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `exec` - Run a request envelope from a file
//! - `init` - Initialize a new database
//! - `backup` - Write every stored key to a JSON file
//! - `restore` - Load a backup file into the database

mod commands;

use crate::config::ArborConfig;
use arbor_core::GraphError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Arbor - schema-driven graph database
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file (default: ./arbor.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database file (overrides [storage] path)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides [server] host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one request envelope and print the response
    Exec {
        /// JSON file holding one request item or an array of them
        #[arg(short, long)]
        file: PathBuf,

        /// Identity token of the caller
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,

        /// Install the access-control schema (User, Role, Revocation)
        #[arg(long)]
        access_control: bool,

        /// Turn permission enforcement on
        #[arg(long)]
        enforce: bool,
    },

    /// Write a backup of every stored key
    Backup {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Identity token of the caller
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Load a backup file
    Restore {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Keep existing data instead of wiping first
        #[arg(long)]
        keep_existing: bool,

        /// Identity token of the caller
        #[arg(short, long)]
        token: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), GraphError> {
    let mut config = ArborConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.path = database;
    }
    if cli.verbose {
        tracing::info!(?config, "effective configuration");
    }

    match cli.command {
        Commands::Server { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Commands::Exec { file, token } => cmd_exec(&config, &file, token.as_deref()),
        Commands::Init {
            force,
            access_control,
            enforce,
        } => cmd_init(&config, force, access_control, enforce),
        Commands::Backup { output, token } => cmd_backup(&config, &output, token.as_deref()),
        Commands::Restore {
            input,
            keep_existing,
            token,
        } => cmd_restore(&config, &input, keep_existing, token.as_deref()),
    }
}
