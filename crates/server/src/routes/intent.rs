use crate::error::{ServerError, ServerResult};
use crate::response::{BatchRecognizeResponse, RecognizeResponse};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Recognition request body.
#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub app_key: String,
    pub text: String,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Batch recognition request body.
#[derive(Debug, Deserialize)]
pub struct BatchRecognizeRequest {
    pub app_key: String,
    pub texts: Vec<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

/// Collapse runs of whitespace to single spaces and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `POST /intent/recognize` — recognize one utterance.
///
/// Recognition failures are in-band (`success=false`, status 200); only
/// malformed input earns a 400 here.
pub async fn recognize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecognizeRequest>,
) -> ServerResult<Json<RecognizeResponse>> {
    if request.app_key.trim().is_empty() {
        return Err(ServerError::BadRequest("app_key must not be empty".into()));
    }
    let text = collapse_whitespace(&request.text);
    if text.is_empty() {
        return Err(ServerError::BadRequest("text must not be empty".into()));
    }

    let response = state
        .service
        .recognize(&request.app_key, &text, request.context.as_ref())
        .await;
    Ok(Json(response))
}

/// `POST /intent/recognize/batch` — recognize up to `max_batch_size` texts
/// concurrently.
pub async fn recognize_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRecognizeRequest>,
) -> ServerResult<Json<BatchRecognizeResponse>> {
    if request.app_key.trim().is_empty() {
        return Err(ServerError::BadRequest("app_key must not be empty".into()));
    }
    if request.texts.is_empty() {
        return Err(ServerError::BadRequest("texts must not be empty".into()));
    }
    let max = state.config.max_batch_size;
    if request.texts.len() > max {
        return Err(ServerError::BadRequest(format!(
            "batch size {} exceeds the maximum of {max}",
            request.texts.len()
        )));
    }

    let mut texts = Vec::with_capacity(request.texts.len());
    for raw in &request.texts {
        let text = collapse_whitespace(raw);
        if text.is_empty() {
            return Err(ServerError::BadRequest(
                "texts must not contain empty entries".into(),
            ));
        }
        texts.push(text);
    }

    let response = state
        .service
        .recognize_batch(&request.app_key, &texts, request.context.as_ref())
        .await;
    Ok(Json(response))
}

/// `GET /intent/logs` — page through recognition logs, newest first.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> ServerResult<impl IntoResponse> {
    let (logs, total) = state
        .service
        .repo()
        .query_logs(query.page, query.page_size)
        .await?;

    Ok(Json(json!({
        "logs": logs,
        "total": total,
        "page": query.page,
        "page_size": query.page_size,
    })))
}

/// `GET /intent/stats` — summary counters over the log table plus the
/// dropped-entry count of the in-memory queue.
pub async fn stats(State(state): State<Arc<AppState>>) -> ServerResult<impl IntoResponse> {
    let stats = state.service.repo().log_stats().await?;
    Ok(Json(json!({
        "total": stats.total,
        "successes": stats.successes,
        "failures": stats.failures,
        "success_rate": if stats.total > 0 {
            stats.successes as f64 / stats.total as f64
        } else {
            0.0
        },
        "avg_processing_time_ms": stats.avg_processing_time_ms,
        "dropped_log_entries": state.service.sink().dropped_count(),
    })))
}
