use serde::{Deserialize, Serialize};

/// Encoder configuration.
///
/// `model_path` is a locator: an `http(s)://` value selects the remote API
/// mode, anything else (including empty) selects the deterministic stub.
/// The choice is made once at startup; per-request behavior never switches
/// modes on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Embedding family tag, sent as the model name in API payloads.
    #[serde(default = "default_model_type")]
    pub model_type: String,

    /// Filesystem or registry locator for the model.
    #[serde(default)]
    pub model_path: String,

    /// Device tag (cpu/gpu); informational for remote encoders.
    #[serde(default = "default_device")]
    pub model_device: String,

    /// API key for the remote endpoint, if it requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Payload dialect of the remote endpoint: `openai`, `huggingface`, or
    /// `custom`.
    #[serde(default = "default_provider")]
    pub api_provider: String,

    /// Vector dimension produced by the stub (remote vectors keep whatever
    /// dimension the service returns).
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Scale output vectors to unit L2 norm.
    #[serde(default = "default_true")]
    pub normalize: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EncoderConfig {
    /// Whether this configuration points at a remote embedding API.
    pub fn is_remote(&self) -> bool {
        self.model_path.starts_with("http://") || self.model_path.starts_with("https://")
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            model_path: String::new(),
            model_device: default_device(),
            api_key: None,
            api_provider: default_provider(),
            dimension: default_dimension(),
            normalize: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model_type() -> String {
    "bge-m3".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_provider() -> String {
    "custom".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}
