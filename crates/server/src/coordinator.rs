use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use embedding::Encoder;
use llm::{ChatClient, ConnectionStatus};
use recognizer::{
    ChainStep, IntentResult, LlmMatcher, PipelineCache, PipelineOutcome, RecognizerKind,
    StepStatus, NO_MATCH_SENTINEL,
};
use serde_json::Value;
use store::{AppContext, ConfigRepository, IntentCategory, RecognitionLog, StoreResult};
use tokio::time::timeout;

use crate::config::ServiceConfig;
use crate::log_sink::LogSink;
use crate::response::{BatchRecognizeResponse, FailureType, RecognizeResponse};
use crate::result_cache::{request_fingerprint, ResultCache};

/// Recognition coordinator.
///
/// Orchestrates one request end to end: result cache, context resolution,
/// compiled pipeline, fallback control, response caching, and the async log
/// sink. Exceptions never propagate to the HTTP layer — anything unexpected
/// becomes a `system_error` response.
pub struct RecognitionService {
    config: Arc<ServiceConfig>,
    repo: Arc<ConfigRepository>,
    encoder: Arc<Encoder>,
    pipelines: PipelineCache,
    cache: ResultCache,
    sink: LogSink,
    llm_matcher: LlmMatcher,
}

impl RecognitionService {
    pub fn new(
        config: Arc<ServiceConfig>,
        repo: Arc<ConfigRepository>,
        encoder: Arc<Encoder>,
        chat: Arc<ChatClient>,
        cache: ResultCache,
        sink: LogSink,
    ) -> Self {
        let pipelines = PipelineCache::new(
            encoder.clone(),
            chat.clone(),
            config.semantic_similarity_threshold,
        );
        Self {
            config,
            repo,
            encoder,
            pipelines,
            cache,
            sink,
            llm_matcher: LlmMatcher::new(chat),
        }
    }

    pub fn config(&self) -> &Arc<ServiceConfig> {
        &self.config
    }

    pub fn repo(&self) -> &Arc<ConfigRepository> {
        &self.repo
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// Eager startup work: load or probe the embedding encoder and, when the
    /// fallback is enabled, probe the LLM endpoint. Failures are recorded,
    /// never fatal.
    pub async fn warm_up(&self) {
        self.encoder.warm_up().await;
        if self.config.enable_llm_fallback {
            self.pipelines.chat_client().probe().await;
        }
    }

    pub fn llm_status(&self) -> (bool, ConnectionStatus) {
        (
            self.config.enable_llm_fallback,
            self.pipelines.chat_client().status(),
        )
    }

    /// Drop every cache derived from one application's configuration: the
    /// assembled context, compiled pipelines under its fingerprint prefix,
    /// and the response namespace.
    pub async fn invalidate_application(&self, app_key: &str) {
        self.repo.invalidate_context(app_key);
        let removed = self.pipelines.invalidate_app(app_key);
        self.cache.invalidate_namespace().await;
        tracing::info!(app_key, removed_pipelines = removed, "invalidated tenant caches");
    }

    /// Recognize one utterance. Never returns an error; the worst outcome is
    /// a `system_error` response within the request deadline.
    pub async fn recognize(
        &self,
        app_key: &str,
        text: &str,
        context: Option<&Value>,
    ) -> RecognizeResponse {
        let started = Instant::now();
        let deadline = self.config.request_deadline();

        let mut response =
            match timeout(deadline, self.recognize_inner(app_key, text, context, started)).await {
                Ok(Ok(response)) => return response,
                Ok(Err(e)) => {
                    tracing::error!(app_key, error = %e, "recognition failed unexpectedly");
                    self.failure_response(
                        FailureType::SystemError,
                        format!("unexpected error: {e}"),
                        Vec::new(),
                        None,
                    )
                }
                Err(_) => {
                    tracing::error!(app_key, "request deadline exceeded");
                    self.failure_response(
                        FailureType::SystemError,
                        format!(
                            "request deadline of {}s exceeded",
                            self.config.request_timeout
                        ),
                        Vec::new(),
                        None,
                    )
                }
            };

        response.processing_time_ms = elapsed_ms(started);
        self.enqueue_log(app_key, text, &response);
        response
    }

    /// Process a batch concurrently. Per-text failures stay in-band.
    pub async fn recognize_batch(
        &self,
        app_key: &str,
        texts: &[String],
        context: Option<&Value>,
    ) -> BatchRecognizeResponse {
        let futures = texts.iter().map(|text| self.recognize(app_key, text, context));
        let results = futures::future::join_all(futures).await;

        let cached_count = results.iter().filter(|r| r.cached).count();
        BatchRecognizeResponse {
            total_count: results.len(),
            cached_count,
            results,
        }
    }

    async fn recognize_inner(
        &self,
        app_key: &str,
        text: &str,
        context: Option<&Value>,
        started: Instant,
    ) -> StoreResult<RecognizeResponse> {
        let Some(ctx) = self.repo.app_context(app_key).await? else {
            return self.handle_missing_config(app_key, text, started).await;
        };
        let app = &ctx.application;

        let cache_enabled = self.config.enable_cache && app.enable_cache;
        let cache_key = request_fingerprint(app_key, text, context);

        if cache_enabled {
            if let Some(mut cached) = self.cache.get(&cache_key).await {
                cached.cached = true;
                cached.recognition_chain = vec![ChainStep::success(
                    "cache",
                    cached.intent.as_deref().unwrap_or(""),
                    cached.confidence.unwrap_or(0.0),
                    elapsed_ms(started),
                )];
                cached.processing_time_ms = elapsed_ms(started);
                self.enqueue_log(app_key, text, &cached);
                return Ok(cached);
            }
        }

        let pipeline = self.pipelines.get_or_compile(app).await;
        let outcome = pipeline.recognize(text, &ctx).await;

        let mut response = self.resolve_outcome(outcome, &ctx, text).await;
        response.processing_time_ms = elapsed_ms(started);

        self.enqueue_log(app_key, text, &response);
        if response.success && cache_enabled {
            self.cache.set(&cache_key, &response).await;
        }
        Ok(response)
    }

    /// Fallback controller: apply the per-application threshold, attempt the
    /// LLM fallback, fall back to the statically configured intent, or
    /// surface a typed failure.
    async fn resolve_outcome(
        &self,
        outcome: PipelineOutcome,
        ctx: &AppContext,
        text: &str,
    ) -> RecognizeResponse {
        let app = &ctx.application;
        let threshold = if app.confidence_threshold > 0.0 {
            app.confidence_threshold
        } else {
            self.config.default_confidence_threshold
        };
        let PipelineOutcome {
            result, mut chain, ..
        } = outcome;

        match result {
            Some(result) if result.confidence >= threshold => {
                self.success_response(result, chain, false, None)
            }

            Some(result) => {
                if app.enable_llm_fallback {
                    if let Some(llm_result) =
                        self.try_llm_fallback(text, &ctx.categories, &mut chain).await
                    {
                        let reason = format!(
                            "LLM fallback (original confidence {:.2} < {:.2})",
                            result.confidence, threshold
                        );
                        return self.success_response(llm_result, chain, true, Some(reason));
                    }
                }

                // Keep the sub-threshold finding for diagnostics.
                let mut response = self.failure_response(
                    FailureType::LowConfidence,
                    format!(
                        "best confidence {:.2} below threshold {:.2}",
                        result.confidence, threshold
                    ),
                    chain,
                    Some(threshold),
                );
                response.intent = Some(result.intent);
                response.confidence = Some(result.confidence);
                response.matched_rules = result.matched_rules;
                response
            }

            None => {
                if app.enable_llm_fallback {
                    if let Some(llm_result) =
                        self.try_llm_fallback(text, &ctx.categories, &mut chain).await
                    {
                        return self.success_response(
                            llm_result,
                            chain,
                            true,
                            Some("LLM fallback (no match)".to_string()),
                        );
                    }
                }

                if let Some(code) = app.fallback_intent_code.as_deref() {
                    if ctx.category_by_code(code).is_some() {
                        chain.push(ChainStep::success("fallback", code, 0.0, 0.0));
                        return RecognizeResponse {
                            success: true,
                            intent: Some(code.to_string()),
                            confidence: Some(0.0),
                            entities: Default::default(),
                            matched_rules: Vec::new(),
                            recognition_chain: chain,
                            processing_time_ms: 0.0,
                            cached: false,
                            fallback_used: true,
                            fallback_reason: Some("static fallback intent".to_string()),
                            final_recognizer: Some("fallback".to_string()),
                            failure_type: None,
                            failure_reason: None,
                            threshold: None,
                            suggestion: None,
                            llm_error: None,
                            llm_error_reason: None,
                        };
                    }
                    tracing::warn!(
                        code,
                        app_key = %app.app_key,
                        "fallback intent code does not name an active category"
                    );
                }

                self.failure_response(
                    FailureType::NoMatch,
                    "no matcher accepted the input".to_string(),
                    chain,
                    Some(threshold),
                )
            }
        }
    }

    /// Unknown tenant or no active categories: salvage through the globally
    /// enabled LLM fallback over every active category, else fail as
    /// `config_missing`.
    async fn handle_missing_config(
        &self,
        app_key: &str,
        text: &str,
        started: Instant,
    ) -> StoreResult<RecognizeResponse> {
        let mut chain = Vec::new();

        if self.config.enable_llm_fallback {
            let categories = self.repo.list_active_categories().await?;
            if !categories.is_empty() {
                if let Some(result) = self.try_llm_fallback(text, &categories, &mut chain).await {
                    let mut response = self.success_response(
                        result,
                        chain,
                        true,
                        Some("LLM fallback (config missing)".to_string()),
                    );
                    response.processing_time_ms = elapsed_ms(started);
                    self.enqueue_log(app_key, text, &response);
                    return Ok(response);
                }
            }
        }

        let mut response = self.failure_response(
            FailureType::ConfigMissing,
            format!("application '{app_key}' not found or has no active categories"),
            chain,
            None,
        );
        response.processing_time_ms = elapsed_ms(started);
        self.enqueue_log(app_key, text, &response);
        Ok(response)
    }

    /// One LLM fallback attempt. The chain always gains exactly one
    /// `llm_fallback` entry describing what happened.
    async fn try_llm_fallback(
        &self,
        text: &str,
        categories: &[IntentCategory],
        chain: &mut Vec<ChainStep>,
    ) -> Option<IntentResult> {
        let start = Instant::now();

        match self.llm_matcher.classify(text, categories).await {
            Ok(verdict) if !verdict.is_no_match() => {
                let time_ms = elapsed_ms(start);
                tracing::info!(
                    intent = %verdict.intent,
                    confidence = verdict.confidence,
                    "LLM fallback matched intent"
                );
                chain.push(ChainStep::success(
                    "llm_fallback",
                    &verdict.intent,
                    verdict.confidence,
                    time_ms,
                ));
                Some(IntentResult::new(
                    &verdict.intent,
                    verdict.confidence,
                    RecognizerKind::Llm,
                ))
            }
            Ok(_) => {
                tracing::info!("LLM fallback found no matching category");
                chain.push(
                    ChainStep::no_match("llm_fallback", elapsed_ms(start))
                        .with_intent(NO_MATCH_SENTINEL, 0.0),
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM fallback failed");
                chain.push(ChainStep::error(
                    "llm_fallback",
                    &e.to_string(),
                    Some(e.reason_code()),
                    elapsed_ms(start),
                ));
                None
            }
        }
    }

    fn success_response(
        &self,
        result: IntentResult,
        chain: Vec<ChainStep>,
        fallback_used: bool,
        fallback_reason: Option<String>,
    ) -> RecognizeResponse {
        let success = result.intent != NO_MATCH_SENTINEL;
        RecognizeResponse {
            success,
            intent: Some(result.intent.clone()),
            confidence: Some(result.confidence),
            entities: result.entities,
            matched_rules: result.matched_rules,
            recognition_chain: chain,
            processing_time_ms: 0.0,
            cached: false,
            fallback_used,
            fallback_reason,
            final_recognizer: Some(result.recognizer_type),
            failure_type: (!success).then_some(FailureType::NoMatch),
            failure_reason: (!success).then(|| NO_MATCH_SENTINEL.to_string()),
            threshold: None,
            suggestion: None,
            llm_error: None,
            llm_error_reason: None,
        }
    }

    fn failure_response(
        &self,
        failure_type: FailureType,
        reason: String,
        chain: Vec<ChainStep>,
        threshold: Option<f64>,
    ) -> RecognizeResponse {
        let (llm_error, llm_error_reason) = chain
            .iter()
            .find(|s| s.recognizer == "llm_fallback" && s.status == StepStatus::Error)
            .map(|s| (s.error.clone(), s.reason.clone()))
            .unwrap_or((None, None));

        let mut detailed = reason;
        if let Some(error) = &llm_error {
            detailed = format!("{detailed} (LLM error: {error})");
        }

        let mut suggestion = suggestion_for(failure_type).to_string();
        if llm_error.is_some() {
            let hint = match llm_error_reason.as_deref() {
                Some("missing_api_key_or_url") => "Check the LLM API key and base URL configuration",
                Some("api_connection_error") => "Check LLM API connectivity and network status",
                Some("unknown_error") => "Check the LLM configuration and service logs",
                _ => "Check the LLM configuration",
            };
            suggestion = format!("{suggestion}\nLLM: {hint}");
        }

        RecognizeResponse {
            success: false,
            intent: None,
            confidence: None,
            entities: Default::default(),
            matched_rules: Vec::new(),
            recognition_chain: chain,
            processing_time_ms: 0.0,
            cached: false,
            fallback_used: false,
            fallback_reason: None,
            final_recognizer: None,
            failure_type: Some(failure_type),
            failure_reason: Some(detailed),
            threshold,
            suggestion: Some(suggestion),
            llm_error,
            llm_error_reason,
        }
    }

    fn enqueue_log(&self, app_key: &str, text: &str, response: &RecognizeResponse) {
        let entry = RecognitionLog {
            id: 0,
            app_key: app_key.to_string(),
            input_text: text.to_string(),
            recognized_intent: response.intent.clone(),
            confidence: response.confidence,
            processing_time_ms: response.processing_time_ms,
            is_success: response.success,
            error_message: response.failure_reason.clone(),
            recognition_chain: serde_json::to_string(&response.recognition_chain)
                .unwrap_or_else(|_| "[]".to_string()),
            matched_rules: serde_json::to_string(&response.matched_rules)
                .unwrap_or_else(|_| "[]".to_string()),
            created_at: Utc::now(),
        };
        self.sink.enqueue(entry);
    }
}

fn suggestion_for(failure_type: FailureType) -> &'static str {
    match failure_type {
        FailureType::NoMatch => {
            "Add more rules, enable the LLM fallback, or configure a fallback intent"
        }
        FailureType::LowConfidence => {
            "Lower the confidence threshold, tune rule weights, or enable the LLM fallback"
        }
        FailureType::SystemError => "Check the service logs and contact an administrator",
        FailureType::ConfigMissing => {
            "Make sure the application is configured with active categories and rules"
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0).max(0.01)
}
