use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{error::AppResult, permissions::Resource};

/// ResponseCache
///
/// Read-through cache for hot listing endpoints, keyed by request path
/// (`/menus`, `/pages/{id}/elements`, ...). Entries expire after the configured TTL and
/// are dropped eagerly whenever an orchestrator mutates the owning resource.
///
/// Every invalidation bumps `generation`. A load that overlapped an invalidation
/// is returned to its caller but never stored.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, (Value, Instant)>>,
    generation: Arc<AtomicU64>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, expires_at) = entry.value();
                if Instant::now() < *expires_at {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries
            .insert(key.into(), (value, Instant::now() + self.ttl));
    }

    /// Drops every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// Drops every cached read served under `/<resource>`.
    pub fn invalidate(&self, resource: Resource) {
        self.invalidate_prefix(&format!("/{}", resource));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// read_through
    ///
    /// Serves `key` from the cache when fresh, otherwise runs `load` and caches its
    /// result unless an invalidation landed while it ran. Values that fail to
    /// round-trip through JSON are simply not cached.
    pub async fn read_through<T, F, Fut>(&self, key: &str, load: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(hit) = self.get(key) {
            match serde_json::from_value::<T>(hit) {
                Ok(value) => {
                    tracing::trace!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key, "discarding undecodable cache entry: {}", e);
                    self.entries.remove(key);
                }
            }
        }

        let started = self.generation.load(Ordering::SeqCst);
        let fresh = load().await?;
        if self.generation.load(Ordering::SeqCst) != started {
            tracing::debug!(key, "cache invalidated during load, not storing");
            return Ok(fresh);
        }
        match serde_json::to_value(&fresh) {
            Ok(value) => self.insert(key, value),
            Err(e) => tracing::warn!(key, "response not cacheable: {}", e),
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalidation_is_scoped_to_the_resource() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("/menus", json!([1]));
        cache.insert("/menus/slug/home", json!({}));
        cache.insert("/pages", json!([2]));

        cache.invalidate(Resource::Menus);

        assert!(cache.get("/menus").is_none());
        assert!(cache.get("/menus/slug/home").is_none());
        assert_eq!(cache.get("/pages"), Some(json!([2])));
    }

    #[tokio::test]
    async fn load_overlapping_invalidation_is_not_stored() {
        let cache = ResponseCache::new(Duration::from_secs(60));

        let served: Vec<u32> = cache
            .read_through("/menus", || async {
                // A mutation commits while the listing is being built.
                cache.invalidate(Resource::Menus);
                Ok(vec![1])
            })
            .await
            .unwrap();
        assert_eq!(served, vec![1]);
        assert!(cache.get("/menus").is_none());

        let served: Vec<u32> = cache
            .read_through("/menus", || async { Ok(vec![2]) })
            .await
            .unwrap();
        assert_eq!(served, vec![2]);
        assert_eq!(cache.get("/menus"), Some(json!([2])));
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("/pages", json!([]));
        assert!(cache.is_empty());
    }
}
