//! # Arbor HTTP API Module
//!
//! This module implements the HTTP front end using axum.
//!
//! ## Endpoints
//!
//! - `POST /request` - Run one request envelope (an item or an array of items)
//! - `GET /health` - Health check
//!
//! The `Authorization` header carries the caller's identity token:
//! `Bearer <token>` or the raw token. It is handed to the engine as is;
//! the engine resolves it against the access-control schema.
//!
//! ## Configuration (Environment Variables)
//!
//! - `ARBOR_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)

mod auth;
mod handlers;
mod types;

pub use auth::bearer_token;
pub use handlers::{health_handler, request_handler};
pub use types::{ApiError, HealthResponse};

use arbor_core::{Database, EngineOptions, GraphError, KvStore};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Backing store chosen at startup.
pub type SharedStore = Box<dyn KvStore + Send>;

/// Shared server state containing the database.
///
/// The engine is single-actor per store, so requests run one at a time.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database<SharedStore>>>,
}

impl AppState {
    /// Create new app state around a database.
    #[must_use]
    pub fn new(db: Database<SharedStore>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Box a store and wrap it in a database.
    #[must_use]
    pub fn from_store(store: impl KvStore + Send + 'static, options: EngineOptions) -> Self {
        let store: SharedStore = Box::new(store);
        Self::new(Database::with_options(store, options))
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `ARBOR_CORS_ORIGINS`:
/// - "*": allows all origins
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("ARBOR_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins (ARBOR_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in ARBOR_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                restricted_cors(allowed_origins)
            }
        }
        None => {
            tracing::debug!("CORS: No ARBOR_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Only localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();
    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/request", post(handlers::request_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer()),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl-C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), GraphError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GraphError::storage(format!("Bind failed: {}", e)))?;

    tracing::info!("Arbor HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GraphError::storage(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
