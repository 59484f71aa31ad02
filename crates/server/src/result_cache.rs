use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

use crate::response::RecognizeResponse;

/// Compute the request fingerprint: `md5(app_key + ":" + text +
/// ":" + canonical_json(context))`. `serde_json` maps are ordered, so the
/// same context object always canonicalizes identically.
pub fn request_fingerprint(app_key: &str, text: &str, context: Option<&Value>) -> String {
    let mut content = format!("{app_key}:{text}");
    if let Some(context) = context {
        content.push(':');
        content.push_str(&context.to_string());
    }
    format!("{:x}", md5::compute(content.as_bytes()))
}

/// Response cache over an external Redis-like store.
///
/// Every failure path degrades to a miss: an unreachable store must never
/// fail recognition. Per-application gating happens at the coordinator; this
/// type only knows the global switch.
pub struct ResultCache {
    conn: Option<MultiplexedConnection>,
    prefix: String,
    ttl_secs: u64,
    enabled: bool,
}

impl ResultCache {
    /// Connect at startup. A failed connection disables the cache with a
    /// warning instead of propagating.
    pub async fn connect(redis_url: &str, prefix: &str, ttl_secs: u64, enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let conn = match redis::Client::open(redis_url) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    tracing::info!(url = redis_url, "connected to result cache");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "result cache unreachable, caching disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid redis URL, caching disabled");
                None
            }
        };

        Self {
            conn,
            prefix: prefix.to_string(),
            ttl_secs,
            enabled,
        }
    }

    /// Cache that never hits; used when caching is switched off and in
    /// tests.
    pub fn disabled() -> Self {
        Self {
            conn: None,
            prefix: String::new(),
            ttl_secs: 0,
            enabled: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.conn.is_some()
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub async fn get(&self, key: &str) -> Option<RecognizeResponse> {
        let mut conn = self.conn.clone()?;
        if !self.enabled {
            return None;
        }

        match conn.get::<_, Option<String>>(self.prefixed(key)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "cache get error");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, response: &RecognizeResponse) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        if !self.enabled {
            return false;
        }

        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize response for cache");
                return false;
            }
        };

        match conn
            .set_ex::<_, _, ()>(self.prefixed(key), raw, self.ttl_secs)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cache set error");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        conn.del::<_, ()>(self.prefixed(key)).await.is_ok()
    }

    /// Drop every key under this cache's prefix. Coarse, used when tenant
    /// configuration changes.
    pub async fn invalidate_namespace(&self) -> usize {
        let Some(mut conn) = self.conn.clone() else {
            return 0;
        };

        let pattern = format!("{}*", self.prefix);
        let keys: Vec<String> = match conn.keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cache invalidate error");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        let count = keys.len();
        if let Err(e) = conn.del::<_, ()>(keys).await {
            tracing::warn!(error = %e, "cache invalidate error");
            return 0;
        }
        count
    }
}
