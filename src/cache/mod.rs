use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shared, immutable response payload.
pub type Payload = Arc<Value>;

struct CacheEntry {
    payload: Payload,
    fetched_at: Instant,
}

/// Response cache keyed by request fingerprint.
///
/// An entry is served only while `now - fetched_at < ttl`. Stale entries are
/// not swept: they stay until the same key is stored again or the LRU bound
/// pushes them out.
pub struct ResponseCache {
    ttl: Duration,
    entries: LruCache<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            ttl,
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Payload> {
        self.get_at(key, Instant::now())
    }

    pub fn put(&mut self, key: String, payload: Payload) {
        self.put_at(key, payload, Instant::now())
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<Payload> {
        let entry = self.entries.get(key)?;
        if now.saturating_duration_since(entry.fetched_at) < self.ttl {
            Some(Arc::clone(&entry.payload))
        } else {
            None
        }
    }

    fn put_at(&mut self, key: String, payload: Payload, now: Instant) {
        self.entries.put(
            key,
            CacheEntry {
                payload,
                fetched_at: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical request fingerprint: endpoint plus parameters sorted by name,
/// then value.
pub fn cache_key(endpoint: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();
    let query = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{endpoint}?{query}")
}
