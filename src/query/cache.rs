use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

struct CachedEntry {
    value: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
}

/// Time-boxed query result cache.
///
/// Results are stored as JSON so a single cache serves every entity type;
/// entries carry their own TTL and are evicted lazily on read.
#[derive(Clone)]
pub struct QueryResultCache {
    data: Arc<RwLock<HashMap<String, CachedEntry>>>,
}

impl QueryResultCache {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        {
            let cache = self.data.read().await;
            if let Some(entry) = cache.get(key) {
                if entry.stored_at.elapsed() < entry.ttl {
                    debug!("query cache hit: {key}");
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }

        // Entry existed but expired; drop it so the map stays bounded by
        // the working set.
        let mut cache = self.data.write().await;
        if let Some(entry) = cache.get(key) {
            if entry.stored_at.elapsed() >= entry.ttl {
                cache.remove(key);
            } else {
                return Some(entry.value.clone());
            }
        }
        None
    }

    pub async fn set(&self, key: String, value: serde_json::Value, ttl: Duration) {
        let mut cache = self.data.write().await;
        cache.insert(
            key,
            CachedEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        let mut cache = self.data.write().await;
        cache.remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.data.write().await;
        cache.clear();
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for QueryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let cache = QueryResultCache::new();
        cache
            .set("k".to_string(), json!([1, 2, 3]), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let cache = QueryResultCache::new();
        cache
            .set("k".to_string(), json!("v"), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = QueryResultCache::new();
        cache
            .set("k".to_string(), json!("v"), Duration::from_secs(60))
            .await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }
}
