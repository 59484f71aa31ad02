use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::models::{Application, IntentCategory, IntentRule};

/// Derived, non-persistent aggregate handed to the recognition pipeline: the
/// active application, its active categories, and the active+enabled rules
/// for those categories.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub application: Application,
    pub categories: Vec<IntentCategory>,
    pub rules: Vec<IntentRule>,
}

impl AppContext {
    /// Look up an active category by its code.
    pub fn category_by_code(&self, code: &str) -> Option<&IntentCategory> {
        self.categories.iter().find(|c| c.code == code)
    }
}

struct Entry {
    value: Arc<AppContext>,
    expires_at: Instant,
}

/// In-process LRU cache of assembled contexts, keyed by `app_key`.
///
/// Any admin write invalidates the whole cache; stale contexts otherwise age
/// out after `ttl` (default 300 s).
pub struct ContextCache {
    inner: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, app_key: &str) -> Option<Arc<AppContext>> {
        let mut cache = self.inner.lock().expect("context cache poisoned");
        match cache.get(app_key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(app_key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, app_key: &str, context: Arc<AppContext>) {
        let mut cache = self.inner.lock().expect("context cache poisoned");
        cache.put(
            app_key.to_string(),
            Entry {
                value: context,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, app_key: &str) {
        let mut cache = self.inner.lock().expect("context cache poisoned");
        cache.pop(app_key);
    }

    pub fn clear(&self) {
        let mut cache = self.inner.lock().expect("context cache poisoned");
        cache.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("context cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(300))
    }
}
