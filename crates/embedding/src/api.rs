use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::EncoderConfig;
use crate::error::EncoderError;

// Shared HTTP client with connection pooling; one per process.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .expect("failed to build HTTP client")
});

#[derive(Clone, Copy)]
enum ProviderKind {
    HuggingFace,
    OpenAi,
    Custom,
}

fn provider_kind(cfg: &EncoderConfig) -> ProviderKind {
    match cfg.api_provider.to_ascii_lowercase().as_str() {
        "hf" | "huggingface" => ProviderKind::HuggingFace,
        "openai" | "gpt" => ProviderKind::OpenAi,
        _ => ProviderKind::Custom,
    }
}

fn build_payload(provider: ProviderKind, texts: &[&str], cfg: &EncoderConfig) -> Value {
    match provider {
        ProviderKind::HuggingFace => json!({ "inputs": texts }),
        ProviderKind::OpenAi => json!({ "input": texts, "model": cfg.model_type }),
        ProviderKind::Custom => json!({ "texts": texts }),
    }
}

/// Batch-encode `texts` through the configured remote endpoint. The caller
/// owns normalization; this function only talks the wire dialects.
pub(crate) async fn encode_via_api(
    texts: &[&str],
    cfg: &EncoderConfig,
) -> Result<Vec<Vec<f32>>, EncoderError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    if !cfg.is_remote() {
        return Err(EncoderError::InvalidConfig(
            "model_path does not name a remote endpoint".into(),
        ));
    }

    let payload = build_payload(provider_kind(cfg), texts, cfg);

    let mut request = HTTP_CLIENT
        .post(&cfg.model_path)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .header("Content-Type", "application/json");
    if let Some(key) = cfg.api_key.as_deref() {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = request
        .json(&payload)
        .send()
        .await
        .map_err(|e| EncoderError::Request(format!("HTTP request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(EncoderError::Request(format!("HTTP error {status}: {body}")));
    }

    let value = response
        .json::<Value>()
        .await
        .map_err(|e| EncoderError::Inference(format!("invalid JSON response: {e}")))?;

    let vectors = parse_embeddings(value)?;
    if vectors.len() != texts.len() {
        return Err(EncoderError::Inference(format!(
            "API returned {} embeddings for {} inputs",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

/// Accepts the response shapes seen in the wild: `{"embeddings": [...]}`,
/// OpenAI-style `{"data": [{"embedding": [...]}, ...]}`, and bare arrays.
pub(crate) fn parse_embeddings(value: Value) -> Result<Vec<Vec<f32>>, EncoderError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_collection(embeddings);
            }
            if let Some(Value::Array(items)) = map.remove("data") {
                let mut vectors = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(mut obj) => match obj.remove("embedding") {
                            Some(embedding) => vectors.push(parse_vector(embedding)?),
                            None => {
                                return Err(EncoderError::Inference(
                                    "missing `embedding` field in data item".into(),
                                ))
                            }
                        },
                        _ => {
                            return Err(EncoderError::Inference(
                                "unexpected entry inside `data` array".into(),
                            ))
                        }
                    }
                }
                return Ok(vectors);
            }
            Err(EncoderError::Inference("unsupported API response shape".into()))
        }
        other => parse_collection(other),
    }
}

fn parse_collection(value: Value) -> Result<Vec<Vec<f32>>, EncoderError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_vector).collect()
            } else {
                parse_vector(Value::Array(items)).map(|v| vec![v])
            }
        }
        other => parse_vector(other).map(|v| vec![v]),
    }
}

fn parse_vector(value: Value) -> Result<Vec<f32>, EncoderError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EncoderError::Inference("non-finite embedding value".into())),
                other => Err(EncoderError::Inference(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(EncoderError::Inference(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
