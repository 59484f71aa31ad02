use serde::{Deserialize, Serialize};

/// Tenant configuration row. Flags select which matchers the compiled
/// pipeline carries; mutating any of them must invalidate the cached
/// pipeline keyed by this application's fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Application {
    pub id: i64,
    pub app_key: String,
    pub name: String,
    pub enable_keyword: bool,
    pub enable_regex: bool,
    pub enable_semantic: bool,
    pub enable_llm_fallback: bool,
    pub enable_cache: bool,
    pub fallback_intent_code: Option<String>,
    pub confidence_threshold: f64,
    pub is_active: bool,
}

/// A labelable intent belonging to one application. `code` is unique within
/// the application; `priority` orders categories when ordering matters
/// (higher first).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IntentCategory {
    pub id: i64,
    pub application_id: i64,
    pub code: String,
    pub name: String,
    pub description: String,
    pub priority: i64,
    pub is_active: bool,
}

/// A matcher-specific pattern attached to a category.
///
/// `rule_type` determines how `content` is read: keyword rules hold
/// comma-separated tokens (a leading `^` marks an exact-match token), regex
/// rules hold one case-insensitive pattern, semantic rules hold a free-text
/// example to be encoded.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IntentRule {
    pub id: i64,
    pub category_id: i64,
    pub rule_type: String,
    pub content: String,
    pub weight: f64,
    pub is_active: bool,
    pub enabled: bool,
}

impl IntentRule {
    /// Parsed rule kind, `None` for unknown type strings.
    pub fn kind(&self) -> Option<RuleKind> {
        RuleKind::parse(&self.rule_type)
    }
}

/// Closed set of rule interpretations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Keyword,
    Regex,
    Semantic,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Keyword => "keyword",
            RuleKind::Regex => "regex",
            RuleKind::Semantic => "semantic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keyword" => Some(RuleKind::Keyword),
            "regex" => Some(RuleKind::Regex),
            "semantic" => Some(RuleKind::Semantic),
            _ => None,
        }
    }
}

/// One recognition attempt, queued through the async log sink and persisted
/// by the background worker. `recognition_chain` and `matched_rules` are
/// serialized JSON snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecognitionLog {
    #[serde(default)]
    pub id: i64,
    pub app_key: String,
    pub input_text: String,
    pub recognized_intent: Option<String>,
    pub confidence: Option<f64>,
    pub processing_time_ms: f64,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub recognition_chain: String,
    pub matched_rules: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Summary counters over the recognition log table.
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub successes: i64,
    pub failures: i64,
    pub avg_processing_time_ms: f64,
}
