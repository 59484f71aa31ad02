use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::ServiceConfig;
use crate::coordinator::RecognitionService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,

    /// Recognition coordinator (pipelines, caches, log sink)
    pub service: Arc<RecognitionService>,

    /// Rate limit tracking: API key -> (count, window start)
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,

    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<ServiceConfig>, service: Arc<RecognitionService>) -> Self {
        Self {
            config,
            service,
            rate_limiter: Arc::new(DashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Authentication is active only when keys are configured.
    pub fn auth_enabled(&self) -> bool {
        !self.config.api_keys.is_empty()
    }

    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Fixed-window rate limit per API key.
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let window = std::time::Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
