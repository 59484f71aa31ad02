use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ::llm::ChatClient;
use embedding::Encoder;
use store::Application;

use crate::chain::{Matcher, Pipeline};
use crate::keyword::KeywordMatcher;
use crate::regex::RegexMatcher;
use crate::semantic::SemanticMatcher;

/// Content-address an application's pipeline-relevant settings. The key is
/// prefixed with the `app_key` so invalidation can sweep a whole tenant.
pub fn pipeline_fingerprint(app: &Application, semantic_threshold: f64) -> String {
    let tuple = format!(
        "{}|{}|{}|{}|{}|{}",
        app.app_key,
        app.enable_keyword,
        app.enable_regex,
        app.enable_semantic,
        app.enable_llm_fallback,
        semantic_threshold,
    );
    format!("{}:{:x}", app.app_key, md5::compute(tuple.as_bytes()))
}

/// Fingerprint-keyed cache of compiled, pre-initialized pipelines.
///
/// Reads dominate; a miss compiles outside the lock and double-checks on
/// insert, so two racing requests agree on one instance.
pub struct PipelineCache {
    inner: Mutex<HashMap<String, Arc<Pipeline>>>,
    encoder: Arc<Encoder>,
    chat: Arc<ChatClient>,
    semantic_threshold: f64,
}

impl PipelineCache {
    pub fn new(encoder: Arc<Encoder>, chat: Arc<ChatClient>, semantic_threshold: f64) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            encoder,
            chat,
            semantic_threshold,
        }
    }

    pub fn semantic_threshold(&self) -> f64 {
        self.semantic_threshold
    }

    pub fn chat_client(&self) -> &Arc<ChatClient> {
        &self.chat
    }

    pub async fn get_or_compile(&self, app: &Application) -> Arc<Pipeline> {
        let key = pipeline_fingerprint(app, self.semantic_threshold);

        if let Some(pipeline) = self.lock().get(&key) {
            return pipeline.clone();
        }

        let pipeline = Arc::new(self.compile(app));
        pipeline.initialize_all().await;
        tracing::info!(
            app_key = %app.app_key,
            matchers = ?pipeline.matcher_kinds(),
            "compiled recognition pipeline"
        );

        self.lock().entry(key).or_insert(pipeline).clone()
    }

    /// Matchers in increasing cost order, per the application's flags. The
    /// LLM stage is owned by the fallback controller rather than compiled
    /// into the first-acceptable chain, so a sentinel answer is never paid
    /// for twice.
    fn compile(&self, app: &Application) -> Pipeline {
        let mut matchers = Vec::new();
        if app.enable_keyword {
            matchers.push(Matcher::Keyword(KeywordMatcher::new()));
        }
        if app.enable_regex {
            matchers.push(Matcher::Regex(RegexMatcher::new()));
        }
        if app.enable_semantic {
            matchers.push(Matcher::Semantic(SemanticMatcher::new(
                self.encoder.clone(),
                self.semantic_threshold,
            )));
        }
        Pipeline::new(matchers)
    }

    /// Remove every cached pipeline belonging to `app_key`. Returns how many
    /// entries were dropped.
    pub fn invalidate_app(&self, app_key: &str) -> usize {
        let prefix = format!("{app_key}:");
        let mut guard = self.lock();
        let before = guard.len();
        guard.retain(|key, _| !key.starts_with(&prefix));
        before - guard.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Pipeline>>> {
        self.inner.lock().expect("pipeline cache poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecognizerKind;
    use ::llm::LlmConfig;
    use embedding::EncoderConfig;

    fn cache() -> PipelineCache {
        PipelineCache::new(
            Arc::new(Encoder::new(EncoderConfig::default())),
            Arc::new(ChatClient::new(LlmConfig::default())),
            0.55,
        )
    }

    fn app(app_key: &str) -> Application {
        Application {
            id: 1,
            app_key: app_key.into(),
            name: "PLM".into(),
            enable_keyword: true,
            enable_regex: true,
            enable_semantic: true,
            enable_llm_fallback: false,
            enable_cache: true,
            fallback_intent_code: None,
            confidence_threshold: 0.7,
            is_active: true,
        }
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = app("plm");
        assert_eq!(pipeline_fingerprint(&a, 0.55), pipeline_fingerprint(&a, 0.55));
    }

    #[test]
    fn fingerprint_changes_with_flags() {
        let a = app("plm");
        let mut b = app("plm");
        b.enable_semantic = false;
        assert_ne!(pipeline_fingerprint(&a, 0.55), pipeline_fingerprint(&b, 0.55));
        assert_ne!(pipeline_fingerprint(&a, 0.55), pipeline_fingerprint(&a, 0.6));
    }

    #[test]
    fn fingerprint_ignores_non_pipeline_fields() {
        let a = app("plm");
        let mut b = app("plm");
        b.name = "renamed".into();
        b.confidence_threshold = 0.9;
        b.enable_cache = false;
        assert_eq!(pipeline_fingerprint(&a, 0.55), pipeline_fingerprint(&b, 0.55));
    }

    #[test]
    fn fingerprint_is_prefixed_by_app_key() {
        assert!(pipeline_fingerprint(&app("plm"), 0.55).starts_with("plm:"));
    }

    #[tokio::test]
    async fn cache_hit_returns_same_instance() {
        let cache = cache();
        let a = app("plm");

        let first = cache.get_or_compile(&a).await;
        let second = cache.get_or_compile(&a).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn compiled_matchers_follow_flags() {
        let cache = cache();
        let mut a = app("plm");
        a.enable_regex = false;

        let pipeline = cache.get_or_compile(&a).await;
        assert_eq!(
            pipeline.matcher_kinds(),
            vec![RecognizerKind::Keyword, RecognizerKind::Semantic]
        );
    }

    #[tokio::test]
    async fn flag_change_recompiles() {
        let cache = cache();
        let a = app("plm");
        let before = cache.get_or_compile(&a).await;

        let mut updated = app("plm");
        updated.enable_semantic = false;
        let after = cache.get_or_compile(&updated).await;

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.matcher_kinds(), vec![RecognizerKind::Keyword, RecognizerKind::Regex]);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn invalidate_sweeps_only_that_tenant() {
        let cache = cache();
        cache.get_or_compile(&app("plm")).await;
        cache.get_or_compile(&app("crm")).await;

        assert_eq!(cache.invalidate_app("plm"), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_app("plm"), 0);
    }
}
