use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Pooled chat-completion client.
///
/// One instance per process is enough; concurrent calls share the underlying
/// connection pool. The client records its last probe outcome but never
/// refuses to start over a failed probe.
pub struct ChatClient {
    http: reqwest::Client,
    cfg: LlmConfig,
    connected: AtomicBool,
    last_probe_at: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

/// Snapshot of the client's connection state, served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub configured: bool,
    pub has_api_key: bool,
    pub has_base_url: bool,
    pub has_model: bool,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub last_probe_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ChatClient {
    pub fn new(cfg: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs_clamped()))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(16)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            cfg,
            connected: AtomicBool::new(false),
            last_probe_at: Mutex::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.cfg.is_complete()
    }

    pub fn config(&self) -> &LlmConfig {
        &self.cfg
    }

    /// Minimal health probe: one tiny completion call. Records the outcome
    /// and returns it.
    pub async fn probe(&self) -> bool {
        *self.last_probe_at.lock().expect("probe lock poisoned") = Some(chrono::Utc::now());

        if !self.is_configured() {
            self.connected.store(false, Ordering::Relaxed);
            return false;
        }

        let ok = self
            .complete("You are a connectivity probe. Reply with OK.", "ping")
            .await
            .is_ok();
        self.connected.store(ok, Ordering::Relaxed);
        if ok {
            tracing::info!("LLM connection probe succeeded");
        } else {
            tracing::warn!("LLM connection probe failed");
        }
        ok
    }

    pub fn status(&self) -> ConnectionStatus {
        let provider = self
            .cfg
            .base_url
            .as_deref()
            .and_then(|url| reqwest::Url::parse(url).ok())
            .and_then(|url| url.host_str().map(|h| h.to_string()));

        ConnectionStatus {
            connected: self.connected.load(Ordering::Relaxed),
            configured: self.is_configured(),
            has_api_key: self.cfg.api_key.as_deref().is_some_and(|v| !v.is_empty()),
            has_base_url: self.cfg.base_url.as_deref().is_some_and(|v| !v.is_empty()),
            has_model: self.cfg.model.as_deref().is_some_and(|v| !v.is_empty()),
            model: self.cfg.model.clone(),
            provider,
            last_probe_at: *self.last_probe_at.lock().expect("probe lock poisoned"),
        }
    }

    /// Send one system+user exchange and return the assistant's content with
    /// markdown fences already stripped. Temperature is pinned low for
    /// reproducible classification output.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        if !self.is_configured() {
            return Err(LlmError::MissingConfig);
        }
        let (Some(base_url), Some(api_key), Some(model)) = (
            self.cfg.base_url.as_deref(),
            self.cfg.api_key.as_deref(),
            self.cfg.model.as_deref(),
        ) else {
            return Err(LlmError::MissingConfig);
        };

        let payload = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.1,
            "max_tokens": 100,
        });

        let response = self
            .http
            .post(base_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Connection(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Connection(format!("HTTP {status}: {body}")));
        }

        let data = response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("invalid JSON body: {e}")))?;

        extract_content(&data)
            .map(|content| strip_code_fences(&content).to_string())
            .ok_or(LlmError::NoContent)
    }
}

/// Pull the assistant text out of the provider-specific response envelope.
/// Understands OpenAI (`choices[0].message.content`), Anthropic (`content`),
/// and generic (`message.content`) shapes.
pub fn extract_content(data: &Value) -> Option<String> {
    if let Some(content) = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }

    if let Some(content) = data.get("content") {
        match content {
            Value::String(s) => return Some(s.clone()),
            // Anthropic block lists: take the first text block.
            Value::Array(blocks) => {
                if let Some(text) = blocks
                    .iter()
                    .find_map(|block| block.get("text").and_then(Value::as_str))
                {
                    return Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    data.get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(|content| content.to_string())
}

/// Unwrap ```json ... ``` (or bare ``` ... ```) fences around a payload.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"));
    match inner {
        Some(rest) => rest.trim_end_matches("```").trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".into()),
            base_url: Some("https://api.example.com/v1/chat/completions".into()),
            model: Some("qwen-plus".into()),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_openai_shape() {
        let data = json!({
            "choices": [{"message": {"content": "{\"intent\": \"SEARCH_PART\"}"}}]
        });
        assert_eq!(
            extract_content(&data).unwrap(),
            "{\"intent\": \"SEARCH_PART\"}"
        );
    }

    #[test]
    fn extracts_anthropic_string_shape() {
        let data = json!({"content": "{\"intent\": \"bom.query\"}"});
        assert_eq!(extract_content(&data).unwrap(), "{\"intent\": \"bom.query\"}");
    }

    #[test]
    fn extracts_anthropic_block_shape() {
        let data = json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(extract_content(&data).unwrap(), "hello");
    }

    #[test]
    fn extracts_generic_message_shape() {
        let data = json!({"message": {"content": "plain"}});
        assert_eq!(extract_content(&data).unwrap(), "plain");
    }

    #[test]
    fn no_content_in_unknown_shape() {
        assert!(extract_content(&json!({"result": 42})).is_none());
    }

    #[test]
    fn strips_json_fences() {
        let fenced = "```json\n{\"intent\": \"part.search\", \"confidence\": 0.95}\n```";
        assert_eq!(
            strip_code_fences(fenced),
            "{\"intent\": \"part.search\", \"confidence\": 0.95}"
        );
    }

    #[test]
    fn strips_bare_fences() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn unfenced_content_untouched() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn unconfigured_complete_is_missing_config() {
        let client = ChatClient::new(LlmConfig::default());
        let err = client.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, LlmError::MissingConfig));
    }

    #[tokio::test]
    async fn unconfigured_probe_fails_fast() {
        let client = ChatClient::new(LlmConfig::default());
        assert!(!client.probe().await);
        let status = client.status();
        assert!(!status.connected);
        assert!(!status.configured);
        assert!(status.last_probe_at.is_some());
    }

    #[test]
    fn status_reports_provider_host() {
        let client = ChatClient::new(configured());
        let status = client.status();
        assert!(status.configured);
        assert_eq!(status.provider.as_deref(), Some("api.example.com"));
        assert_eq!(status.model.as_deref(), Some("qwen-plus"));
    }
}
