//! # Arbor - Graph Database Server
//!
//! The main binary for the Arbor schema-driven graph engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                apps/arbor (THE BINARY)              │
//! │                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────┐  │
//! │  │   CLI       │    │   HTTP API  │    │ Config  │  │
//! │  │  (clap)     │    │   (axum)    │    │ (toml)  │  │
//! │  └──────┬──────┘    └──────┬──────┘    └────┬────┘  │
//! │         └──────────────────┼────────────────┘       │
//! │                            ▼                        │
//! │                    ┌───────────────┐                │
//! │                    │  arbor-core   │                │
//! │                    │ (THE ENGINE)  │                │
//! │                    └───────────────┘                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Create a database with the access-control schema, enforcement on
//! arbor init --access-control --enforce
//!
//! # Run one request envelope from a file
//! arbor exec -f request.json --token "$TOKEN"
//!
//! # Start the HTTP server
//! arbor server --host 0.0.0.0 --port 8080
//! ```

use arbor::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // ARBOR_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ARBOR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "arbor=info,arbor_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Arbor startup banner.
fn print_banner() {
    println!(
        r#"
   █████╗ ██████╗ ██████╗  ██████╗ ██████╗
  ██╔══██╗██╔══██╗██╔══██╗██╔═══██╗██╔══██╗
  ███████║██████╔╝██████╔╝██║   ██║██████╔╝
  ██╔══██║██╔══██╗██╔══██╗██║   ██║██╔══██╗
  ██║  ██║██║  ██║██████╔╝╚██████╔╝██║  ██║
  ╚═╝  ╚═╝╚═╝  ╚═╝╚═════╝  ╚═════╝ ╚═╝  ╚═╝

  Graph Database v{}

  Schema-driven • Permissioned
"#,
        env!("CARGO_PKG_VERSION")
    );
}
