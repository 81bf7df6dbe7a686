//! Response Cache
//!
//! TTL cache for successful backend responses. Expiry is evaluated lazily on
//! read; there is no background sweeper and no LRU eviction.

use crate::domain::entities::ResponseDescriptor;
use crate::domain::ports::Clock;
use crate::domain::value_objects::CacheKey;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedResponse {
    response: ResponseDescriptor,
    inserted_at: Instant,
    ttl: Duration,
}

impl CachedResponse {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }
}

/// Concurrent response cache keyed by `(method, path, query hash)`.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CachedResponse>,
    clock: Arc<dyn Clock>,
    /// Optional cap on stored entries; `None` keeps the cache unbounded
    max_entries: Option<usize>,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Return a cached response younger than `ttl`. Stale entries are
    /// removed on the way out.
    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Option<ResponseDescriptor> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if entry.is_fresh(now, ttl) {
                return Some(entry.response.clone());
            }
        }
        self.entries
            .remove_if(key, |_, e| !e.is_fresh(now, ttl));
        None
    }

    /// Store a response. Returns false when the cache is full even after
    /// dropping expired entries.
    pub fn insert(&self, key: CacheKey, response: ResponseDescriptor, ttl: Duration) -> bool {
        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(&key) && self.entries.len() >= max {
                self.purge_expired();
                if self.entries.len() >= max {
                    tracing::debug!("response cache full ({} entries), not caching", max);
                    return false;
                }
            }
        }

        self.entries.insert(
            key,
            CachedResponse {
                response,
                inserted_at: self.clock.now(),
                ttl,
            },
        );
        true
    }

    /// Drop every entry older than the TTL it was stored with. Returns the
    /// number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now, e.ttl));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
