//! Optional per-service response cache (SPEC_FULL.md §10), trimmed from
//! `_teacher_ref/cache/mod.rs::ResponseCache` to a TTL-only policy (no
//! size-bounded LRU eviction, since nothing in the gateway's spec calls for
//! bounding cache memory by byte size rather than entry lifetime). Never on
//! the hot path unless a service opts in via `ServiceDescriptor.cache`.

use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

/// Caps how much of a response body is buffered for caching; larger
/// responses are simply never cached.
pub const MAX_CACHED_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey {
    pub service_id: String,
    pub path_and_query: String,
}

struct Entry {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    cached_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<CacheKey, Entry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(CachedResponse { status: entry.status, headers: entry.headers.clone(), body: entry.body.clone() })
    }

    /// Stores `body` under `key` if it fits within the cap; does nothing
    /// otherwise (§10: caching is cheap ambient infrastructure, never a
    /// correctness requirement, so silently skipping an oversized body is
    /// acceptable).
    pub fn put(&self, key: CacheKey, status: u16, headers: Vec<(String, String)>, body: Bytes, ttl: Duration) {
        if body.len() > MAX_CACHED_BODY_BYTES {
            return;
        }
        self.entries.insert(key, Entry { status, headers, body, cached_at: Instant::now(), ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_the_cached_body() {
        let cache = ResponseCache::new();
        let key = CacheKey { service_id: "svc".into(), path_and_query: "/a".into() };
        cache.put(key.clone(), 200, vec![], Bytes::from_static(b"hello"), Duration::from_secs(60));
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = ResponseCache::new();
        let key = CacheKey { service_id: "svc".into(), path_and_query: "/a".into() };
        cache.put(key.clone(), 200, vec![], Bytes::from_static(b"hello"), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn oversized_body_is_not_cached() {
        let cache = ResponseCache::new();
        let key = CacheKey { service_id: "svc".into(), path_and_query: "/a".into() };
        let body = Bytes::from(vec![0u8; MAX_CACHED_BODY_BYTES + 1]);
        cache.put(key.clone(), 200, vec![], body, Duration::from_secs(60));
        assert!(cache.get(&key).is_none());
    }
}
