use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use embedding::EncoderConfig;
use llm::LlmConfig;
use serde::{Deserialize, Serialize};

/// Service configuration, loaded from an optional `intent` config file and
/// `INTENT__*` environment variables (for example
/// `INTENT__DEFAULT_CONFIDENCE_THRESHOLD=0.8`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Maximum number of texts accepted by the batch endpoint
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Header carrying the client API key
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Accepted API keys; when empty, authentication is disabled (dev mode)
    #[serde(default)]
    pub api_keys: HashSet<String>,

    /// Rate limit: requests per minute per API key
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Relational store with applications, categories, rules, and logs
    #[serde(default = "default_database_url")]
    pub database_url: String,

    // ── Result cache ────────────────────────────────────────────────────
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// Result cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    // ── Recognition thresholds ──────────────────────────────────────────
    #[serde(default = "default_confidence_threshold")]
    pub default_confidence_threshold: f64,

    #[serde(default = "default_semantic_threshold")]
    pub semantic_similarity_threshold: f64,

    // ── LLM fallback ────────────────────────────────────────────────────
    #[serde(default)]
    pub enable_llm_fallback: bool,

    #[serde(default)]
    pub llm_api_key: Option<String>,

    #[serde(default)]
    pub llm_base_url: Option<String>,

    #[serde(default)]
    pub llm_model: Option<String>,

    /// Per-call LLM timeout in seconds (hard ceiling 30)
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout: u64,

    // ── Embedding encoder ───────────────────────────────────────────────
    /// Embedding family tag
    #[serde(default = "default_model_type")]
    pub model_type: String,

    /// Model locator; an http(s) URL selects the remote API encoder
    #[serde(default)]
    pub model_path: String,

    #[serde(default = "default_model_device")]
    pub model_device: String,

    #[serde(default)]
    pub embedding_api_key: Option<String>,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    // ── Async log sink ──────────────────────────────────────────────────
    /// Bounded queue capacity; overflow drops entries and counts them
    #[serde(default = "default_log_queue_size")]
    pub log_queue_size: usize,
}

impl ServiceConfig {
    /// Load configuration from an optional `intent` file plus environment
    /// variables with the `INTENT` prefix.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("intent").required(false))
            .add_source(config::Environment::with_prefix("INTENT").separator("__"));

        let config: ServiceConfig = builder.build()?.try_deserialize()?;

        if config.api_keys.is_empty() {
            tracing::warn!("no API keys configured, authentication is disabled");
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.llm_api_key.clone(),
            base_url: self.llm_base_url.clone(),
            model: self.llm_model.clone(),
            timeout_secs: self.llm_timeout,
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            model_type: self.model_type.clone(),
            model_path: self.model_path.clone(),
            model_device: self.model_device.clone(),
            api_key: self.embedding_api_key.clone(),
            dimension: self.embedding_dimension,
            ..Default::default()
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_batch_size: default_max_batch_size(),
            api_key_header: default_api_key_header(),
            api_keys: HashSet::new(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            enable_cors: true,
            log_level: default_log_level(),
            database_url: default_database_url(),
            redis_url: default_redis_url(),
            enable_cache: true,
            cache_ttl: default_cache_ttl(),
            cache_prefix: default_cache_prefix(),
            default_confidence_threshold: default_confidence_threshold(),
            semantic_similarity_threshold: default_semantic_threshold(),
            enable_llm_fallback: false,
            llm_api_key: None,
            llm_base_url: None,
            llm_model: None,
            llm_timeout: default_llm_timeout(),
            model_type: default_model_type(),
            model_path: String::new(),
            model_device: default_model_device(),
            embedding_api_key: None,
            embedding_dimension: default_embedding_dimension(),
            log_queue_size: default_log_queue_size(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_batch_size() -> usize {
    100
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_rate_limit_per_minute() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "sqlite://intent.db?mode=rwc".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_prefix() -> String {
    "intent:".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_semantic_threshold() -> f64 {
    0.55
}

fn default_llm_timeout() -> u64 {
    10
}

fn default_model_type() -> String {
    "bge-m3".to_string()
}

fn default_model_device() -> String {
    "cpu".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_log_queue_size() -> usize {
    1000
}
