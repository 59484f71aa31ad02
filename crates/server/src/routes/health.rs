use crate::error::ServerResult;
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Liveness probe. Returns 200 whenever the process is up.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "intent-service",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
    }))
}

/// Readiness probe: verifies the configuration repository answers.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> ServerResult<impl IntoResponse> {
    let repository = match state.service.repo().ping().await {
        Ok(()) => "ready",
        Err(e) => {
            tracing::warn!(error = %e, "repository not reachable");
            "unavailable"
        }
    };

    Ok(Json(json!({
        "status": if repository == "ready" { "ready" } else { "degraded" },
        "service": "intent-service",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "components": {
            "api": "ready",
            "repository": repository,
        }
    })))
}

/// LLM connection status: configuration completeness and last probe result.
pub async fn llm_status(State(state): State<Arc<AppState>>) -> ServerResult<impl IntoResponse> {
    let (enabled, status) = state.service.llm_status();
    Ok(Json(json!({
        "enabled": enabled,
        "status": status,
    })))
}
