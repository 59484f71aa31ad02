//! API route handlers.
//!
//! - `health`: liveness, readiness, and LLM connection status
//! - `intent`: recognition endpoints plus operator log/stat queries

pub mod health;
pub mod intent;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info. Root endpoint, no authentication.
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "Intent Recognition Service",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/intent/recognize",
            "/intent/recognize/batch",
            "/intent/logs",
            "/intent/stats",
            "/health",
            "/ready",
            "/status/llm"
        ]
    })))
}

/// 404 handler for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
