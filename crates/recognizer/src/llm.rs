use std::sync::Arc;

use ::llm::{ChatClient, LlmError};
use serde_json::Value;
use store::{AppContext, IntentCategory};

use crate::types::{IntentResult, RecognizerKind};

/// Literal the model must return when no category fits. Part of the wire
/// contract with the fallback controller; preserved byte-for-byte.
pub const NO_MATCH_SENTINEL: &str = "LLM无法匹配";

/// Ceiling applied to model-reported confidence.
pub const LLM_CONFIDENCE_CAP: f64 = 0.95;

const SYSTEM_PROMPT: &str =
    "You are an intent classification assistant. Respond only with valid JSON.";

/// Validated classification outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmVerdict {
    pub intent: String,
    pub confidence: f64,
}

impl LlmVerdict {
    pub fn no_match() -> Self {
        Self {
            intent: NO_MATCH_SENTINEL.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.intent == NO_MATCH_SENTINEL
    }
}

/// LLM classifier, used as the last matcher in cost order and as the
/// fallback strategy when rule-based matchers fail or score low.
pub struct LlmMatcher {
    client: Arc<ChatClient>,
}

impl LlmMatcher {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ChatClient> {
        &self.client
    }

    pub fn enabled(&self) -> bool {
        self.client.is_configured()
    }

    /// Typed classification: transport and parse failures surface as
    /// [`LlmError`] so the caller can record the reason code; an answer
    /// naming an unknown category is normalized to the sentinel.
    pub async fn classify(
        &self,
        text: &str,
        categories: &[IntentCategory],
    ) -> Result<LlmVerdict, LlmError> {
        let active: Vec<&IntentCategory> = categories.iter().filter(|c| c.is_active).collect();
        if active.is_empty() {
            return Err(LlmError::NoContent);
        }

        let prompt = build_prompt(text, &active);
        let content = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        tracing::debug!(response = %content, "LLM classification response");

        Ok(parse_verdict(&content, &active)?)
    }

    /// Never-raise variant used when the matcher runs inside a pipeline:
    /// every failure becomes the sentinel with zero confidence.
    pub async fn recognize(&self, text: &str, ctx: &AppContext) -> Option<IntentResult> {
        let verdict = match self.classify(text, &ctx.categories).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "LLM classification failed, returning sentinel");
                LlmVerdict::no_match()
            }
        };
        Some(IntentResult::new(
            &verdict.intent,
            verdict.confidence,
            RecognizerKind::Llm,
        ))
    }
}

/// Classification prompt: active categories highest priority first, a fixed
/// instruction block mandating JSON-only output, and the sentinel contract.
fn build_prompt(text: &str, active: &[&IntentCategory]) -> String {
    let mut ordered: Vec<&&IntentCategory> = active.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    let category_lines = ordered
        .iter()
        .map(|c| format!("- {}: {} (描述: {})", c.code, c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Classify the following user input into one of these intent categories.

Available categories:
{category_lines}

User input: "{text}"

Examples:
- Input: "查找零件A123" → Output: {{"intent": "part.search", "confidence": 0.95}}
- Input: "找一个螺栓" → Output: {{"intent": "part.search", "confidence": 0.95}}
- Input: "创建新零件" → Output: {{"intent": "part.create", "confidence": 0.95}}
- Input: "查询BOM结构" → Output: {{"intent": "bom.query", "confidence": 0.95}}

Respond ONLY with a JSON object in this exact format:
{{"intent": "category_code", "confidence": 0.95}}

Choose the most appropriate category based on the user's intent.
If none of the categories match, respond with:
{{"intent": "{NO_MATCH_SENTINEL}", "confidence": 0.0}}"#
    )
}

fn parse_verdict(content: &str, active: &[&IntentCategory]) -> Result<LlmVerdict, LlmError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|_| LlmError::InvalidResponse(format!("non-JSON content: {content}")))?;

    let Some(intent) = value.get("intent").and_then(Value::as_str) else {
        return Err(LlmError::NoContent);
    };
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5);

    if intent == NO_MATCH_SENTINEL {
        return Ok(LlmVerdict::no_match());
    }
    if !active.iter().any(|c| c.code == intent) {
        tracing::warn!(intent, "LLM returned unknown intent code");
        return Ok(LlmVerdict::no_match());
    }

    Ok(LlmVerdict {
        intent: intent.to_string(),
        confidence: confidence.clamp(0.0, LLM_CONFIDENCE_CAP),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<IntentCategory> {
        vec![
            IntentCategory {
                id: 1,
                application_id: 1,
                code: "SEARCH_PART".into(),
                name: "零件查询".into(),
                description: "按编号或名称查找零件".into(),
                priority: 5,
                is_active: true,
            },
            IntentCategory {
                id: 2,
                application_id: 1,
                code: "SEARCH_DRAWING".into(),
                name: "图纸查询".into(),
                description: "查找工程图纸".into(),
                priority: 9,
                is_active: true,
            },
            IntentCategory {
                id: 3,
                application_id: 1,
                code: "RETIRED".into(),
                name: "旧".into(),
                description: String::new(),
                priority: 1,
                is_active: false,
            },
        ]
    }

    fn active(categories: &[IntentCategory]) -> Vec<&IntentCategory> {
        categories.iter().filter(|c| c.is_active).collect()
    }

    #[test]
    fn prompt_orders_categories_by_priority_desc() {
        let cats = categories();
        let prompt = build_prompt("查找图纸", &active(&cats));

        let drawing = prompt.find("SEARCH_DRAWING").unwrap();
        let part = prompt.find("SEARCH_PART").unwrap();
        assert!(drawing < part);
        assert!(!prompt.contains("RETIRED"));
        assert!(prompt.contains(NO_MATCH_SENTINEL));
        assert!(prompt.contains("User input: \"查找图纸\""));
    }

    #[test]
    fn verdict_accepts_known_code_and_caps_confidence() {
        let cats = categories();
        let verdict = parse_verdict(
            r#"{"intent": "SEARCH_DRAWING", "confidence": 0.99}"#,
            &active(&cats),
        )
        .unwrap();
        assert_eq!(verdict.intent, "SEARCH_DRAWING");
        assert!((verdict.confidence - LLM_CONFIDENCE_CAP).abs() < 1e-9);
    }

    #[test]
    fn verdict_normalizes_unknown_code_to_sentinel() {
        let cats = categories();
        let verdict = parse_verdict(
            r#"{"intent": "NOT_A_CODE", "confidence": 0.9}"#,
            &active(&cats),
        )
        .unwrap();
        assert!(verdict.is_no_match());
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn verdict_preserves_sentinel() {
        let cats = categories();
        let verdict = parse_verdict(
            &format!(r#"{{"intent": "{NO_MATCH_SENTINEL}", "confidence": 0.0}}"#),
            &active(&cats),
        )
        .unwrap();
        assert!(verdict.is_no_match());
    }

    #[test]
    fn verdict_rejects_non_json() {
        let cats = categories();
        let err = parse_verdict("the intent is SEARCH_PART", &active(&cats)).unwrap_err();
        assert_eq!(err.reason_code(), "unknown_error");
    }

    #[test]
    fn verdict_without_intent_field_is_no_result() {
        let cats = categories();
        let err = parse_verdict(r#"{"confidence": 0.8}"#, &active(&cats)).unwrap_err();
        assert_eq!(err.reason_code(), "llm_no_result");
    }

    #[test]
    fn missing_confidence_defaults_to_half() {
        let cats = categories();
        let verdict =
            parse_verdict(r#"{"intent": "SEARCH_PART"}"#, &active(&cats)).unwrap();
        assert!((verdict.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn classify_without_categories_is_no_result() {
        let matcher = LlmMatcher::new(Arc::new(ChatClient::new(::llm::LlmConfig::default())));
        let err = matcher.classify("text", &[]).await.unwrap_err();
        assert_eq!(err.reason_code(), "llm_no_result");
    }

    #[tokio::test]
    async fn unconfigured_client_reports_missing_config() {
        let matcher = LlmMatcher::new(Arc::new(ChatClient::new(::llm::LlmConfig::default())));
        let cats = categories();
        let err = matcher.classify("查找零件", &cats).await.unwrap_err();
        assert_eq!(err.reason_code(), "missing_api_key_or_url");
        assert!(!matcher.enabled());
    }
}
