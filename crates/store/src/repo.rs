use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::context::{AppContext, ContextCache};
use crate::error::StoreResult;
use crate::models::{Application, IntentCategory, IntentRule, LogStats, RecognitionLog};

/// Read-mostly repository over the four entity kinds the recognition core
/// consumes: applications, categories, rules, and recognition logs.
///
/// Assembled contexts are cached in-process with a short TTL; every write
/// path invalidates the cache so admin edits become visible within one
/// request.
pub struct ConfigRepository {
    pool: SqlitePool,
    contexts: ContextCache,
}

impl ConfigRepository {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        // An in-memory database exists per connection; keep exactly one
        // long-lived connection so the schema survives.
        let is_memory = database_url.contains(":memory:");
        let options = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(20)
        };

        let pool = options
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            contexts: ContextCache::default(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap connectivity check for readiness probes.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the core tables when they do not exist yet. Schema evolution
    /// proper is handled outside this service.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                enable_keyword INTEGER NOT NULL DEFAULT 1,
                enable_regex INTEGER NOT NULL DEFAULT 1,
                enable_semantic INTEGER NOT NULL DEFAULT 1,
                enable_llm_fallback INTEGER NOT NULL DEFAULT 0,
                enable_cache INTEGER NOT NULL DEFAULT 1,
                fallback_intent_code TEXT,
                confidence_threshold REAL NOT NULL DEFAULT 0.7,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS intent_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                UNIQUE(application_id, code)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS intent_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER NOT NULL REFERENCES intent_categories(id) ON DELETE CASCADE,
                rule_type TEXT NOT NULL,
                content TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0,
                is_active INTEGER NOT NULL DEFAULT 1,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recognition_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_key TEXT NOT NULL,
                input_text TEXT NOT NULL,
                recognized_intent TEXT,
                confidence REAL,
                processing_time_ms REAL NOT NULL DEFAULT 0,
                is_success INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                recognition_chain TEXT NOT NULL DEFAULT '[]',
                matched_rules TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rules_category ON intent_rules(category_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_logs_app_key ON recognition_logs(app_key, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Read paths consumed by the recognition core ─────────────────────

    pub async fn get_application_by_key(&self, app_key: &str) -> StoreResult<Option<Application>> {
        let app = sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE app_key = ?")
            .bind(app_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(app)
    }

    /// Active categories of one application, highest priority first.
    pub async fn get_categories_by_application(
        &self,
        application_id: i64,
    ) -> StoreResult<Vec<IntentCategory>> {
        let categories = sqlx::query_as::<_, IntentCategory>(
            "SELECT * FROM intent_categories WHERE application_id = ? AND is_active = 1 \
             ORDER BY priority DESC, id ASC",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    /// Active and enabled rules for the given category ids.
    pub async fn get_active_rules_for_categories(
        &self,
        category_ids: &[i64],
    ) -> StoreResult<Vec<IntentRule>> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; category_ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM intent_rules WHERE is_active = 1 AND enabled = 1 \
             AND category_id IN ({placeholders}) ORDER BY id ASC"
        );
        let mut query = sqlx::query_as::<_, IntentRule>(&sql);
        for id in category_ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Every active category across all applications. Used when an unknown
    /// tenant is salvaged through the globally enabled LLM fallback.
    pub async fn list_active_categories(&self) -> StoreResult<Vec<IntentCategory>> {
        let categories = sqlx::query_as::<_, IntentCategory>(
            "SELECT * FROM intent_categories WHERE is_active = 1 ORDER BY priority DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    /// Assemble the recognition context for one tenant, through the TTL
    /// cache. Returns `None` when the application is missing, inactive, or
    /// has no active categories.
    pub async fn app_context(&self, app_key: &str) -> StoreResult<Option<Arc<AppContext>>> {
        if let Some(cached) = self.contexts.get(app_key) {
            return Ok(Some(cached));
        }

        let Some(application) = self.get_application_by_key(app_key).await? else {
            tracing::warn!(app_key, "application not found");
            return Ok(None);
        };
        if !application.is_active {
            tracing::warn!(app_key, "application is inactive");
            return Ok(None);
        }

        let categories = self.get_categories_by_application(application.id).await?;
        if categories.is_empty() {
            tracing::warn!(app_key, "no active categories for application");
            return Ok(None);
        }

        let category_ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
        let rules = self.get_active_rules_for_categories(&category_ids).await?;

        let context = Arc::new(AppContext {
            application,
            categories,
            rules,
        });
        self.contexts.put(app_key, context.clone());
        Ok(Some(context))
    }

    /// Drop the cached context for one tenant.
    pub fn invalidate_context(&self, app_key: &str) {
        self.contexts.invalidate(app_key);
    }

    /// Drop every cached context. Called on any admin write.
    pub fn invalidate_all_contexts(&self) {
        self.contexts.clear();
    }

    // ── Recognition log persistence and operator queries ────────────────

    pub async fn insert_log(&self, entry: &RecognitionLog) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO recognition_logs \
             (app_key, input_text, recognized_intent, confidence, processing_time_ms, \
              is_success, error_message, recognition_chain, matched_rules, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.app_key)
        .bind(&entry.input_text)
        .bind(&entry.recognized_intent)
        .bind(entry.confidence)
        .bind(entry.processing_time_ms)
        .bind(entry.is_success)
        .bind(&entry.error_message)
        .bind(&entry.recognition_chain)
        .bind(&entry.matched_rules)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Page through recognition logs, newest first. Returns the page and the
    /// total row count.
    pub async fn query_logs(
        &self,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<RecognitionLog>, i64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 200);
        let offset = (page - 1) * page_size;

        let logs = sqlx::query_as::<_, RecognitionLog>(
            "SELECT * FROM recognition_logs ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recognition_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok((logs, total))
    }

    pub async fn log_stats(&self) -> StoreResult<LogStats> {
        let (total, successes, avg_ms): (i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_success), 0), AVG(processing_time_ms) \
             FROM recognition_logs",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LogStats {
            total,
            successes,
            failures: total - successes,
            avg_processing_time_ms: avg_ms.unwrap_or(0.0),
        })
    }

    // ── Write paths (admin layer lives elsewhere; these carry the cache
    //    invalidation hooks and back the tests) ──────────────────────────

    pub async fn create_application(&self, app: &Application) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO applications \
             (app_key, name, enable_keyword, enable_regex, enable_semantic, \
              enable_llm_fallback, enable_cache, fallback_intent_code, \
              confidence_threshold, is_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&app.app_key)
        .bind(&app.name)
        .bind(app.enable_keyword)
        .bind(app.enable_regex)
        .bind(app.enable_semantic)
        .bind(app.enable_llm_fallback)
        .bind(app.enable_cache)
        .bind(&app.fallback_intent_code)
        .bind(app.confidence_threshold)
        .bind(app.is_active)
        .execute(&self.pool)
        .await?;

        self.invalidate_all_contexts();
        Ok(result.last_insert_rowid())
    }

    pub async fn update_application(&self, app: &Application) -> StoreResult<()> {
        sqlx::query(
            "UPDATE applications SET name = ?, enable_keyword = ?, enable_regex = ?, \
             enable_semantic = ?, enable_llm_fallback = ?, enable_cache = ?, \
             fallback_intent_code = ?, confidence_threshold = ?, is_active = ? \
             WHERE app_key = ?",
        )
        .bind(&app.name)
        .bind(app.enable_keyword)
        .bind(app.enable_regex)
        .bind(app.enable_semantic)
        .bind(app.enable_llm_fallback)
        .bind(app.enable_cache)
        .bind(&app.fallback_intent_code)
        .bind(app.confidence_threshold)
        .bind(app.is_active)
        .bind(&app.app_key)
        .execute(&self.pool)
        .await?;

        self.invalidate_all_contexts();
        Ok(())
    }

    pub async fn create_category(&self, category: &IntentCategory) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO intent_categories \
             (application_id, code, name, description, priority, is_active) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(category.application_id)
        .bind(&category.code)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.priority)
        .bind(category.is_active)
        .execute(&self.pool)
        .await?;

        self.invalidate_all_contexts();
        Ok(result.last_insert_rowid())
    }

    pub async fn create_rule(&self, rule: &IntentRule) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO intent_rules \
             (category_id, rule_type, content, weight, is_active, enabled) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.category_id)
        .bind(&rule.rule_type)
        .bind(&rule.content)
        .bind(rule.weight)
        .bind(rule.is_active)
        .bind(rule.enabled)
        .execute(&self.pool)
        .await?;

        self.invalidate_all_contexts();
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_repo() -> ConfigRepository {
        let repo = ConfigRepository::connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        repo.ensure_schema().await.expect("schema");
        repo
    }

    fn sample_app(app_key: &str) -> Application {
        Application {
            id: 0,
            app_key: app_key.into(),
            name: "PLM assistant".into(),
            enable_keyword: true,
            enable_regex: true,
            enable_semantic: false,
            enable_llm_fallback: false,
            enable_cache: true,
            fallback_intent_code: None,
            confidence_threshold: 0.7,
            is_active: true,
        }
    }

    fn sample_category(application_id: i64, code: &str, priority: i64) -> IntentCategory {
        IntentCategory {
            id: 0,
            application_id,
            code: code.into(),
            name: code.to_lowercase(),
            description: format!("{code} operations"),
            priority,
            is_active: true,
        }
    }

    fn sample_rule(category_id: i64, rule_type: &str, content: &str) -> IntentRule {
        IntentRule {
            id: 0,
            category_id,
            rule_type: rule_type.into(),
            content: content.into(),
            weight: 1.0,
            is_active: true,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn application_round_trip() {
        let repo = memory_repo().await;
        repo.create_application(&sample_app("plm_assistant"))
            .await
            .unwrap();

        let app = repo
            .get_application_by_key("plm_assistant")
            .await
            .unwrap()
            .expect("application exists");
        assert_eq!(app.name, "PLM assistant");
        assert!(app.enable_keyword);
        assert!((app.confidence_threshold - 0.7).abs() < f64::EPSILON);

        assert!(repo.get_application_by_key("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn context_assembly_filters_inactive() {
        let repo = memory_repo().await;
        let app_id = repo.create_application(&sample_app("plm")).await.unwrap();

        let active = repo
            .create_category(&sample_category(app_id, "SEARCH_PART", 10))
            .await
            .unwrap();
        let mut inactive = sample_category(app_id, "OLD_INTENT", 5);
        inactive.is_active = false;
        let inactive_id = repo.create_category(&inactive).await.unwrap();

        repo.create_rule(&sample_rule(active, "keyword", "零件,部件"))
            .await
            .unwrap();
        repo.create_rule(&sample_rule(inactive_id, "keyword", "旧"))
            .await
            .unwrap();
        let mut disabled = sample_rule(active, "regex", r"P-\d{5}");
        disabled.enabled = false;
        repo.create_rule(&disabled).await.unwrap();

        let ctx = repo.app_context("plm").await.unwrap().expect("context");
        assert_eq!(ctx.categories.len(), 1);
        assert_eq!(ctx.categories[0].code, "SEARCH_PART");
        assert_eq!(ctx.rules.len(), 1);
        assert_eq!(ctx.rules[0].content, "零件,部件");
    }

    #[tokio::test]
    async fn context_none_for_missing_or_empty_app() {
        let repo = memory_repo().await;
        assert!(repo.app_context("ghost").await.unwrap().is_none());

        // Application without categories also yields no context.
        repo.create_application(&sample_app("empty")).await.unwrap();
        assert!(repo.app_context("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn categories_ordered_by_priority() {
        let repo = memory_repo().await;
        let app_id = repo.create_application(&sample_app("plm")).await.unwrap();
        repo.create_category(&sample_category(app_id, "LOW", 1))
            .await
            .unwrap();
        repo.create_category(&sample_category(app_id, "HIGH", 9))
            .await
            .unwrap();

        let categories = repo.get_categories_by_application(app_id).await.unwrap();
        assert_eq!(categories[0].code, "HIGH");
        assert_eq!(categories[1].code, "LOW");
    }

    #[tokio::test]
    async fn admin_write_invalidates_context_cache() {
        let repo = memory_repo().await;
        let app_id = repo.create_application(&sample_app("plm")).await.unwrap();
        repo.create_category(&sample_category(app_id, "SEARCH_PART", 10))
            .await
            .unwrap();

        let before = repo.app_context("plm").await.unwrap().expect("context");
        assert!(before.rules.is_empty());

        // The new rule must be visible immediately, not after the TTL.
        let cat_id = before.categories[0].id;
        repo.create_rule(&sample_rule(cat_id, "keyword", "^查找零件"))
            .await
            .unwrap();

        let after = repo.app_context("plm").await.unwrap().expect("context");
        assert_eq!(after.rules.len(), 1);
    }

    #[tokio::test]
    async fn log_insert_query_and_stats() {
        let repo = memory_repo().await;

        for (n, ok) in [(1, true), (2, true), (3, false)] {
            repo.insert_log(&RecognitionLog {
                id: 0,
                app_key: "plm".into(),
                input_text: format!("query {n}"),
                recognized_intent: ok.then(|| "SEARCH_PART".to_string()),
                confidence: ok.then_some(0.9),
                processing_time_ms: 12.0,
                is_success: ok,
                error_message: (!ok).then(|| "no rules matched the input".to_string()),
                recognition_chain: "[]".into(),
                matched_rules: "[]".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let (page, total) = repo.query_logs(1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);

        let stats = repo.log_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert!((stats.avg_processing_time_ms - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn global_active_categories_across_applications() {
        let repo = memory_repo().await;
        let a = repo.create_application(&sample_app("a")).await.unwrap();
        let b = repo.create_application(&sample_app("b")).await.unwrap();
        repo.create_category(&sample_category(a, "SEARCH_PART", 1))
            .await
            .unwrap();
        repo.create_category(&sample_category(b, "SEARCH_DRAWING", 9))
            .await
            .unwrap();

        let all = repo.list_active_categories().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code, "SEARCH_DRAWING");
    }
}
