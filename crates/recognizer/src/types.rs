use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use store::IntentRule;

/// Closed set of matcher variants, ordered by expected cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerKind {
    Keyword,
    Regex,
    Semantic,
    Llm,
}

impl RecognizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognizerKind::Keyword => "keyword",
            RecognizerKind::Regex => "regex",
            RecognizerKind::Semantic => "semantic",
            RecognizerKind::Llm => "llm",
        }
    }
}

/// Outcome of one matcher attempt within a recognition chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    NoMatch,
    Skipped,
    Error,
}

/// One entry of the per-request audit trace. Every matcher the pipeline
/// touches leaves exactly one entry, in invocation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    pub recognizer: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainStep {
    pub fn success(recognizer: &str, intent: &str, confidence: f64, time_ms: f64) -> Self {
        Self {
            recognizer: recognizer.to_string(),
            status: StepStatus::Success,
            intent: Some(intent.to_string()),
            confidence: Some(confidence),
            time_ms,
            reason: None,
            error: None,
        }
    }

    pub fn no_match(recognizer: &str, time_ms: f64) -> Self {
        Self {
            recognizer: recognizer.to_string(),
            status: StepStatus::NoMatch,
            intent: None,
            confidence: None,
            time_ms,
            reason: None,
            error: None,
        }
    }

    pub fn skipped(recognizer: &str, reason: &str) -> Self {
        Self {
            recognizer: recognizer.to_string(),
            status: StepStatus::Skipped,
            intent: None,
            confidence: None,
            time_ms: 0.0,
            reason: Some(reason.to_string()),
            error: None,
        }
    }

    pub fn error(recognizer: &str, error: &str, reason: Option<&str>, time_ms: f64) -> Self {
        Self {
            recognizer: recognizer.to_string(),
            status: StepStatus::Error,
            intent: None,
            confidence: None,
            time_ms,
            reason: reason.map(|r| r.to_string()),
            error: Some(error.to_string()),
        }
    }

    /// Attach the intent a no-match step still reported (the LLM sentinel).
    pub fn with_intent(mut self, intent: &str, confidence: f64) -> Self {
        self.intent = Some(intent.to_string());
        self.confidence = Some(confidence);
        self
    }
}

/// Snapshot of a rule that argued for the returned intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub id: i64,
    pub rule_type: String,
    pub content: String,
    pub weight: f64,
}

impl From<&IntentRule> for MatchedRule {
    fn from(rule: &IntentRule) -> Self {
        Self {
            id: rule.id,
            rule_type: rule.rule_type.clone(),
            content: rule.content.clone(),
            weight: rule.weight,
        }
    }
}

/// A matcher's finding: the candidate intent, how sure the matcher is, and
/// which rules argued for it. The pipeline attaches the chain and timing
/// before handing the result on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub matched_rules: Vec<MatchedRule>,
    #[serde(default)]
    pub entities: HashMap<String, String>,
    pub recognizer_type: String,
    #[serde(default)]
    pub recognition_chain: Vec<ChainStep>,
    #[serde(default)]
    pub processing_time_ms: f64,
}

impl IntentResult {
    pub fn new(intent: &str, confidence: f64, kind: RecognizerKind) -> Self {
        Self {
            intent: intent.to_string(),
            confidence,
            matched_rules: Vec::new(),
            entities: HashMap::new(),
            recognizer_type: kind.as_str().to_string(),
            recognition_chain: Vec::new(),
            processing_time_ms: 0.0,
        }
    }

    pub fn with_rules(mut self, rules: Vec<MatchedRule>) -> Self {
        self.matched_rules = rules;
        self
    }

    pub fn with_entities(mut self, entities: HashMap<String, String>) -> Self {
        self.entities = entities;
        self
    }
}
