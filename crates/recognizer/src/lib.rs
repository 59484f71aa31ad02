//! Cascading intent recognition pipeline.
//!
//! Four matcher variants share one contract — take an utterance plus the
//! tenant's categories and rules, return at most one candidate intent:
//!
//! - **keyword** — exact and substring token lookup with position scoring
//! - **regex** — case-insensitive patterns; named captures become entities
//! - **semantic** — cosine similarity over batch-encoded rule examples
//! - **llm** — remote JSON classifier, also usable as a fallback stage
//!
//! The [`Pipeline`] runs them in increasing cost order with
//! first-acceptable semantics and records an audit trace for every matcher
//! touched. Compiled pipelines are cached per tenant under a fingerprint of
//! the pipeline-relevant flags and invalidated by `app_key` prefix when an
//! application changes.

pub mod chain;
pub mod compile;
pub mod error;
pub mod keyword;
pub mod llm;
pub mod regex;
pub mod semantic;
pub mod types;

pub use crate::chain::{Matcher, Pipeline, PipelineOutcome};
pub use crate::compile::{pipeline_fingerprint, PipelineCache};
pub use crate::error::RecognizerError;
pub use crate::keyword::KeywordMatcher;
pub use crate::llm::{LlmMatcher, LlmVerdict, LLM_CONFIDENCE_CAP, NO_MATCH_SENTINEL};
pub use crate::regex::RegexMatcher;
pub use crate::semantic::{SemanticMatcher, DEFAULT_SIMILARITY_THRESHOLD};
pub use crate::types::{ChainStep, IntentResult, MatchedRule, RecognizerKind, StepStatus};
