//! Server initialization and routing: the axum router, middleware stack,
//! shared-state construction, and graceful shutdown with log-queue drain.

use crate::config::ServiceConfig;
use crate::coordinator::RecognitionService;
use crate::error::ServerError;
use crate::log_sink::LogSink;
use crate::middleware::{api_key_auth, log_requests, request_id};
use crate::result_cache::ResultCache;
use crate::routes::{api_info, health, intent, not_found};
use crate::state::AppState;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use embedding::global_encoder;
use llm::ChatClient;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use store::ConfigRepository;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the router with all routes and middleware.
///
/// Public routes: `/`, `/health`, `/ready`, `/status/llm`. Everything under
/// `/intent` requires an API key when keys are configured.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/status/llm", get(health::llm_status));

    let protected_routes = Router::new()
        .route("/intent/recognize", post(intent::recognize))
        .route("/intent/recognize/batch", post(intent::recognize_batch))
        .route("/intent/logs", get(intent::logs))
        .route("/intent/stats", get(intent::stats))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            // Small grace over the coordinator's own deadline so in-band
            // system_error responses win the race.
            Duration::from_secs(state.config.request_timeout + 2),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the shared state: repository, encoder, chat client, result
/// cache, log sink, and the recognition coordinator on top of them.
pub async fn build_state(config: ServiceConfig) -> Result<Arc<AppState>, ServerError> {
    let config = Arc::new(config);

    let repo = ConfigRepository::connect(&config.database_url)
        .await
        .map_err(|e| ServerError::Config(format!("repository connection failed: {e}")))?;
    repo.ensure_schema()
        .await
        .map_err(|e| ServerError::Config(format!("schema bootstrap failed: {e}")))?;
    let repo = Arc::new(repo);

    let encoder = global_encoder(&config.encoder_config());
    let chat = Arc::new(ChatClient::new(config.llm_config()));
    let cache = ResultCache::connect(
        &config.redis_url,
        &config.cache_prefix,
        config.cache_ttl,
        config.enable_cache,
    )
    .await;
    let sink = LogSink::spawn(repo.clone(), config.log_queue_size);

    let service = Arc::new(RecognitionService::new(
        config.clone(),
        repo,
        encoder,
        chat,
        cache,
        sink,
    ));

    Ok(Arc::new(AppState::new(config, service)))
}

/// Start the intent recognition server. Blocks until SIGTERM or Ctrl+C,
/// then drains the log queue before returning.
pub async fn start_server(config: ServiceConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_target(false)
        .json()
        .init();

    let state = build_state(config.clone()).await?;

    // Warm-up runs in the background; a slow model download or LLM probe
    // must not delay the listener.
    let warm_state = state.clone();
    tokio::spawn(async move {
        warm_state.service.warm_up().await;
    });

    let app = build_router(state.clone());
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        %addr,
        api_keys = config.api_keys.len(),
        cache = config.enable_cache,
        llm_fallback = config.enable_llm_fallback,
        "starting intent recognition server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cooperative drain of the recognition-log queue.
    state.service.sink().shutdown(Duration::from_secs(10)).await;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
