//! Text embedding encoder for the intent recognition service.
//!
//! Semantic rules and inbound utterances are turned into unit-norm dense
//! vectors here. Two modes:
//!
//! - **API mode** — `model_path` is an `http(s)://` locator; texts are sent
//!   to the remote endpoint (OpenAI-, HuggingFace-, or custom-dialect
//!   payloads) through a pooled client.
//! - **Stub mode** — a deterministic hash-seeded pseudo-embedding. Cheap,
//!   reproducible, and good enough for rule-vs-rule discrimination in
//!   development and tests.
//!
//! The mode is fixed at startup: if the remote endpoint fails its warm-up
//! probe the encoder degrades to the stub once, with a warning, rather than
//! flapping per request. The process-wide encoder is a lazy singleton shared
//! by every semantic matcher instance.

pub mod config;
pub mod error;
pub mod normalize;

mod api;
mod stub;

pub use config::EncoderConfig;
pub use error::EncoderError;
pub use normalize::{cosine_similarity, l2_normalize_in_place};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::api::encode_via_api;
use crate::stub::pseudo_embedding;

static GLOBAL_ENCODER: OnceCell<Arc<Encoder>> = OnceCell::new();

/// Thread-safe text encoder. Cheap to share behind an [`Arc`]; all state is
/// the configuration plus the degraded flag set at warm-up.
pub struct Encoder {
    cfg: EncoderConfig,
    degraded: AtomicBool,
}

impl Encoder {
    pub fn new(cfg: EncoderConfig) -> Self {
        Self {
            cfg,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.cfg
    }

    /// Whether requests are currently served by the deterministic stub.
    pub fn is_stub(&self) -> bool {
        !self.cfg.is_remote() || self.degraded.load(Ordering::Relaxed)
    }

    /// Probe the remote endpoint once at startup. A failed probe degrades
    /// the encoder to stub mode for the lifetime of the process; it never
    /// refuses to start.
    pub async fn warm_up(&self) -> bool {
        if !self.cfg.is_remote() {
            tracing::info!(
                model = %self.cfg.model_type,
                dimension = self.cfg.dimension,
                "encoder running in stub mode"
            );
            return true;
        }

        match encode_via_api(&["warm-up"], &self.cfg).await {
            Ok(_) => {
                tracing::info!(
                    endpoint = %self.cfg.model_path,
                    model = %self.cfg.model_type,
                    "embedding endpoint probe succeeded"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.cfg.model_path,
                    error = %e,
                    "embedding endpoint probe failed, degrading to stub embeddings"
                );
                self.degraded.store(true, Ordering::Relaxed);
                false
            }
        }
    }

    /// Encode one text into a unit-norm vector.
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut vectors = self.encode_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EncoderError::Inference("encoder returned no output".into()))
    }

    /// Encode a batch of texts in one call, preserving input order.
    pub async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if self.is_stub() {
            return Ok(texts
                .iter()
                .map(|text| pseudo_embedding(text, &self.cfg))
                .collect());
        }

        let mut vectors = encode_via_api(texts, &self.cfg).await?;
        if self.cfg.normalize {
            for vector in vectors.iter_mut() {
                l2_normalize_in_place(vector);
            }
        }
        Ok(vectors)
    }
}

/// Process-wide encoder singleton. The first caller's configuration wins;
/// later calls return the already-initialized instance.
pub fn global_encoder(cfg: &EncoderConfig) -> Arc<Encoder> {
    GLOBAL_ENCODER
        .get_or_init(|| Arc::new(Encoder::new(cfg.clone())))
        .clone()
}
