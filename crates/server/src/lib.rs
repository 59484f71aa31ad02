//! Intent recognition service — HTTP API and recognition coordinator.
//!
//! A client posts a short utterance plus an application key; the service
//! answers with the best-matching intent, a confidence score, the chain of
//! recognizers consulted, and any extracted entities. Per-application flags
//! select which matchers the compiled pipeline carries.
//!
//! # Endpoints
//!
//! Public (no authentication):
//!
//! - `GET /` — API information
//! - `GET /health` — liveness probe
//! - `GET /ready` — readiness probe (repository connectivity)
//! - `GET /status/llm` — LLM fallback connection status
//!
//! Protected (API key, when keys are configured):
//!
//! - `POST /intent/recognize` — recognize one utterance
//! - `POST /intent/recognize/batch` — recognize up to `max_batch_size` texts
//! - `GET /intent/logs` — page through recognition logs
//! - `GET /intent/stats` — summary statistics
//!
//! # Quick start
//!
//! ```rust,no_run
//! use server::ServiceConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod log_sink;
pub mod middleware;
pub mod response;
pub mod result_cache;
pub mod routes;
pub mod server;
pub mod state;

pub use crate::config::ServiceConfig;
pub use crate::coordinator::RecognitionService;
pub use crate::error::{ServerError, ServerResult};
pub use crate::log_sink::LogSink;
pub use crate::response::{BatchRecognizeResponse, FailureType, RecognizeResponse};
pub use crate::result_cache::{request_fingerprint, ResultCache};
pub use crate::server::{build_router, build_state, start_server};
pub use crate::state::AppState;
