use serde::{Deserialize, Serialize};

/// Hard ceiling for the per-call timeout, regardless of configuration.
pub const MAX_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the remote chat-completion endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    /// Full URL of the chat-completion endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Per-call timeout in seconds, clamped to [1, 30].
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// All three connection fields are present and non-empty.
    pub fn is_complete(&self) -> bool {
        [&self.api_key, &self.base_url, &self.model]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }

    pub fn timeout_secs_clamped(&self) -> u64 {
        self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS)
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_without_all_fields() {
        let mut cfg = LlmConfig::default();
        assert!(!cfg.is_complete());

        cfg.api_key = Some("sk-test".into());
        cfg.base_url = Some("https://api.example.com/v1/chat/completions".into());
        assert!(!cfg.is_complete());

        cfg.model = Some("qwen-plus".into());
        assert!(cfg.is_complete());
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let cfg = LlmConfig {
            api_key: Some(String::new()),
            base_url: Some("https://api.example.com".into()),
            model: Some("qwen-plus".into()),
            ..Default::default()
        };
        assert!(!cfg.is_complete());
    }

    #[test]
    fn timeout_clamped_to_ceiling() {
        let cfg = LlmConfig {
            timeout_secs: 120,
            ..Default::default()
        };
        assert_eq!(cfg.timeout_secs_clamped(), MAX_TIMEOUT_SECS);

        let cfg = LlmConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.timeout_secs_clamped(), 1);
    }
}
