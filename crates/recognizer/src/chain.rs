use std::time::Instant;

use store::AppContext;

use crate::error::RecognizerError;
use crate::keyword::KeywordMatcher;
use crate::llm::LlmMatcher;
use crate::regex::RegexMatcher;
use crate::semantic::SemanticMatcher;
use crate::types::{ChainStep, IntentResult, RecognizerKind};

/// Closed variant set over the four matcher implementations. Dispatch is a
/// plain `match`; no trait objects needed for a set this small.
pub enum Matcher {
    Keyword(KeywordMatcher),
    Regex(RegexMatcher),
    Semantic(SemanticMatcher),
    Llm(LlmMatcher),
}

impl Matcher {
    pub fn kind(&self) -> RecognizerKind {
        match self {
            Matcher::Keyword(_) => RecognizerKind::Keyword,
            Matcher::Regex(_) => RecognizerKind::Regex,
            Matcher::Semantic(_) => RecognizerKind::Semantic,
            Matcher::Llm(_) => RecognizerKind::Llm,
        }
    }

    /// The pipeline honors this flag by recording a skipped chain entry
    /// instead of invoking the matcher.
    pub fn enabled(&self) -> bool {
        match self {
            Matcher::Llm(matcher) => matcher.enabled(),
            _ => true,
        }
    }

    pub async fn recognize(
        &self,
        text: &str,
        ctx: &AppContext,
    ) -> Result<Option<IntentResult>, RecognizerError> {
        match self {
            Matcher::Keyword(matcher) => Ok(matcher.recognize(text, ctx)),
            Matcher::Regex(matcher) => Ok(matcher.recognize(text, ctx)),
            Matcher::Semantic(matcher) => matcher.recognize(text, ctx).await,
            Matcher::Llm(matcher) => Ok(matcher.recognize(text, ctx).await),
        }
    }

    /// One-time setup hook. Index construction is lazy, so there is little
    /// to do beyond announcing ourselves.
    pub async fn initialize(&self) {
        tracing::debug!(recognizer = self.kind().as_str(), "matcher initialized");
    }

    pub async fn shutdown(&self) {
        tracing::debug!(recognizer = self.kind().as_str(), "matcher shut down");
    }
}

/// Result of one pipeline run: the accepted finding (if any) and the full
/// audit trace. The chain travels with the outcome so concurrent requests
/// over a shared pipeline never interleave traces.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub result: Option<IntentResult>,
    pub chain: Vec<ChainStep>,
    pub total_time_ms: f64,
}

/// Ordered composition of matchers with first-acceptable semantics.
pub struct Pipeline {
    matchers: Vec<Matcher>,
}

impl Pipeline {
    /// Internal acceptance floor, distinct from the per-application
    /// confidence threshold the fallback controller enforces.
    pub const ACCEPTANCE_FLOOR: f64 = 0.5;

    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    pub fn matcher_kinds(&self) -> Vec<RecognizerKind> {
        self.matchers.iter().map(|m| m.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub async fn initialize_all(&self) {
        for matcher in &self.matchers {
            matcher.initialize().await;
        }
    }

    pub async fn shutdown_all(&self) {
        for matcher in &self.matchers {
            matcher.shutdown().await;
        }
    }

    /// Run matchers in order until one clears the acceptance floor. Matcher
    /// failures are recorded in the chain and iteration continues.
    pub async fn recognize(&self, text: &str, ctx: &AppContext) -> PipelineOutcome {
        let mut chain = Vec::with_capacity(self.matchers.len());
        let mut total_time_ms = 0.0;

        for matcher in &self.matchers {
            let name = matcher.kind().as_str();
            if !matcher.enabled() {
                chain.push(ChainStep::skipped(name, "disabled"));
                continue;
            }

            let start = Instant::now();
            let attempt = matcher.recognize(text, ctx).await;
            let elapsed_ms = elapsed_ms_floor(start);
            total_time_ms += elapsed_ms;

            match attempt {
                Ok(Some(result)) if result.confidence > Self::ACCEPTANCE_FLOOR => {
                    tracing::debug!(
                        recognizer = name,
                        intent = %result.intent,
                        confidence = result.confidence,
                        time_ms = elapsed_ms,
                        "intent matched"
                    );
                    chain.push(ChainStep::success(name, &result.intent, result.confidence, elapsed_ms));

                    let mut result = result;
                    result.recognition_chain = chain.clone();
                    result.processing_time_ms = total_time_ms;
                    return PipelineOutcome {
                        result: Some(result),
                        chain,
                        total_time_ms,
                    };
                }
                Ok(_) => chain.push(ChainStep::no_match(name, elapsed_ms)),
                Err(e) => {
                    tracing::error!(recognizer = name, error = %e, "matcher failed");
                    chain.push(ChainStep::error(name, &e.to_string(), None, elapsed_ms));
                }
            }
        }

        PipelineOutcome {
            result: None,
            chain,
            total_time_ms,
        }
    }

    /// Run every enabled matcher and keep the highest-confidence result.
    /// Used only on explicit request; the service path is first-acceptable.
    pub async fn recognize_combined(&self, text: &str, ctx: &AppContext) -> PipelineOutcome {
        let mut chain = Vec::with_capacity(self.matchers.len());
        let mut results: Vec<IntentResult> = Vec::new();
        let mut total_time_ms = 0.0;

        for matcher in &self.matchers {
            let name = matcher.kind().as_str();
            if !matcher.enabled() {
                chain.push(ChainStep::skipped(name, "disabled"));
                continue;
            }

            let start = Instant::now();
            let attempt = matcher.recognize(text, ctx).await;
            let elapsed_ms = elapsed_ms_floor(start);
            total_time_ms += elapsed_ms;

            match attempt {
                Ok(Some(result)) => {
                    chain.push(ChainStep::success(name, &result.intent, result.confidence, elapsed_ms));
                    results.push(result);
                }
                Ok(None) => chain.push(ChainStep::no_match(name, elapsed_ms)),
                Err(e) => {
                    tracing::error!(recognizer = name, error = %e, "matcher failed");
                    chain.push(ChainStep::error(name, &e.to_string(), None, elapsed_ms));
                }
            }
        }

        let best = results
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|mut result| {
                result.recognition_chain = chain.clone();
                result.processing_time_ms = total_time_ms;
                result
            });

        PipelineOutcome {
            result: best,
            chain,
            total_time_ms,
        }
    }
}

// Sub-10µs matchers still report a visible duration.
fn elapsed_ms_floor(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0).max(0.01)
}
