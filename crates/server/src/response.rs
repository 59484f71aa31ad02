use std::collections::HashMap;

use recognizer::{ChainStep, MatchedRule};
use serde::{Deserialize, Serialize};

/// Failure taxonomy carried in-band on unsuccessful responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    NoMatch,
    LowConfidence,
    SystemError,
    ConfigMissing,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::NoMatch => "no_match",
            FailureType::LowConfidence => "low_confidence",
            FailureType::SystemError => "system_error",
            FailureType::ConfigMissing => "config_missing",
        }
    }
}

/// Public recognition result. Both successes and failures use this shape;
/// failures set `success=false` and the `failure_*` fields while still
/// carrying the accumulated recognition chain and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub success: bool,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub entities: HashMap<String, String>,
    #[serde(default)]
    pub matched_rules: Vec<MatchedRule>,
    #[serde(default)]
    pub recognition_chain: Vec<ChainStep>,
    #[serde(default)]
    pub processing_time_ms: f64,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub final_recognizer: Option<String>,
    #[serde(default)]
    pub failure_type: Option<FailureType>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub llm_error: Option<String>,
    #[serde(default)]
    pub llm_error_reason: Option<String>,
}

/// Batch endpoint envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRecognizeResponse {
    pub results: Vec<RecognizeResponse>,
    pub total_count: usize,
    pub cached_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use recognizer::StepStatus;

    #[test]
    fn failure_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureType::LowConfidence).unwrap(),
            "\"low_confidence\""
        );
        assert_eq!(FailureType::ConfigMissing.as_str(), "config_missing");
    }

    #[test]
    fn response_round_trips_all_normative_fields() {
        let mut entities = HashMap::new();
        entities.insert("pn".to_string(), "P-12345".to_string());

        let response = RecognizeResponse {
            success: true,
            intent: Some("SEARCH_PART".into()),
            confidence: Some(0.82),
            entities,
            matched_rules: vec![MatchedRule {
                id: 3,
                rule_type: "regex".into(),
                content: r"(?P<pn>P-\d{5})".into(),
                weight: 1.0,
            }],
            recognition_chain: vec![ChainStep::success("regex", "SEARCH_PART", 0.82, 1.3)],
            processing_time_ms: 2.4,
            cached: false,
            fallback_used: false,
            fallback_reason: None,
            final_recognizer: Some("regex".into()),
            failure_type: None,
            failure_reason: None,
            threshold: None,
            suggestion: None,
            llm_error: None,
            llm_error_reason: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        let back: RecognizeResponse = serde_json::from_str(&json).unwrap();

        assert!(back.success);
        assert_eq!(back.intent.as_deref(), Some("SEARCH_PART"));
        assert_eq!(back.confidence, Some(0.82));
        assert_eq!(back.entities["pn"], "P-12345");
        assert_eq!(back.matched_rules.len(), 1);
        assert_eq!(back.recognition_chain.len(), 1);
        assert_eq!(back.recognition_chain[0].status, StepStatus::Success);
        assert_eq!(back.final_recognizer.as_deref(), Some("regex"));
        assert!((back.processing_time_ms - 2.4).abs() < 1e-9);
    }

    #[test]
    fn failure_response_round_trips() {
        let response = RecognizeResponse {
            success: false,
            intent: None,
            confidence: None,
            entities: HashMap::new(),
            matched_rules: Vec::new(),
            recognition_chain: vec![ChainStep::no_match("keyword", 0.4)],
            processing_time_ms: 0.4,
            cached: false,
            fallback_used: false,
            fallback_reason: None,
            final_recognizer: None,
            failure_type: Some(FailureType::NoMatch),
            failure_reason: Some("no matcher accepted the input".into()),
            threshold: Some(0.7),
            suggestion: Some("Add more rules".into()),
            llm_error: None,
            llm_error_reason: None,
        };

        let back: RecognizeResponse =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert!(!back.success);
        assert_eq!(back.failure_type, Some(FailureType::NoMatch));
        assert_eq!(back.threshold, Some(0.7));
    }
}
