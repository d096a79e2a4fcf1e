//! # HTTP Handlers

use super::auth::bearer_token;
use super::types::{ApiError, HealthResponse};
use super::AppState;
use arbor_core::Response;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /request`
///
/// The body is one request item or an array of them.
pub async fn request_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Response>, ApiError> {
    let token = bearer_token(&headers);
    let mut db = state.db.lock().await;
    let response = db.execute_json(&body, token.as_deref())?;
    Ok(Json(response))
}
