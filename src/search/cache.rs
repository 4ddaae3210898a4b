//! Search result cache with TTL expiry and LRU eviction
use crate::clock::Clock;
use crate::error::CacheError;
use crate::search::SearchResult;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use lru::LruCache;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Cache key for search results.
///
/// Built from the canonical (sorted) query, sort and pagination, so two
/// requests that differ only in condition order share a key. The free-form
/// parts are length-prefixed, so no choice of query or sort field can
/// spell out another request's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(canonical_query: &str, sort_field: &str, sort_order: &str, limit: usize, offset: usize) -> Self {
        CacheKey(format!(
            "{}:{canonical_query}|{}:{sort_field}|{sort_order}|limit={limit}|offset={offset}",
            canonical_query.len(),
            sort_field.len(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: SearchResult,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(value: SearchResult, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
            last_accessed_at: now,
        }
    }

    /// Expired once `ttl` has fully elapsed since creation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (now - self.created_at).to_std() {
            Ok(age) => age >= self.ttl,
            // Clock went backwards; entry is younger than zero.
            Err(_) => false,
        }
    }
}

/// Bounded result cache.
///
/// Expiry is checked lazily on lookup and wins over recency: an expired
/// entry is dropped and counted as a miss even if it was just touched.
pub struct ResultCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
    max_entries: NonZeroUsize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(max_entries: NonZeroUsize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
            clock,
            max_entries,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a cached result, refreshing its recency.
    pub fn get(&self, key: &CacheKey) -> Option<SearchResult> {
        let found = match self.lookup(key) {
            Ok(found) => found,
            Err(e) => {
                warn!("{e}; treating lookup of {key} as a miss");
                None
            }
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn lookup(&self, key: &CacheKey) -> Result<Option<SearchResult>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock("get")?;

        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => return Ok(None),
        };
        if expired {
            entries.pop(key);
            debug!("Cache entry expired: {key}");
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            entry.last_accessed_at = now;
            entry.value.clone()
        }))
    }

    /// Insert or overwrite a result. At capacity the least recently
    /// accessed entry is evicted first.
    pub fn set(&self, key: CacheKey, value: SearchResult, ttl: Duration) {
        let now = self.clock.now();
        let mut entries = match self.lock("set") {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{e}; result for {key} not cached");
                return;
            }
        };

        let entry = CacheEntry::new(value, ttl, now);
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                debug!("Cache full, evicted least recently used entry: {evicted}");
            }
        }
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = match self.lock("purge") {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{e}; purge skipped");
                return 0;
            }
        };

        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Drop all entries. Hit and miss counters are kept.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.entries.clear_poison();
    }

    pub fn len(&self) -> usize {
        self.lock("len").map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self
            .lock("stats")
            .map(|entries| entries.iter().filter(|(_, e)| !e.is_expired(now)).count())
            .unwrap_or(0);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        CacheStats {
            entries,
            max_entries: self.max_entries.get(),
            ttl_seconds: self.default_ttl.as_secs(),
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
        }
    }

    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, LruCache<CacheKey, CacheEntry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::LockPoisoned(op))
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::thread;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 13, 12, 0, 0).unwrap(),
        ))
    }

    fn result(query: &str) -> SearchResult {
        SearchResult {
            query_used: query.to_string(),
            ..SearchResult::default()
        }
    }

    fn cache(max: usize, clock: Arc<ManualClock>) -> ResultCache {
        ResultCache::new(NonZeroUsize::new(max).unwrap(), Duration::from_secs(60), clock)
    }

    #[test]
    fn test_cache_set_get() {
        let cache = cache(10, clock());
        cache.set("k".into(), result("q"), Duration::from_secs(60));

        let hit = cache.get(&"k".into()).unwrap();
        assert_eq!(hit.query_used, "q");
        assert!(cache.get(&"missing".into()).is_none());
    }

    #[test]
    fn test_ttl_boundary() {
        let clock = clock();
        let cache = cache(10, clock.clone());
        cache.set("k".into(), result("q"), Duration::from_secs(5));

        clock.advance(chrono::Duration::milliseconds(4999));
        assert!(cache.get(&"k".into()).is_some());

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(cache.get(&"k".into()).is_none());
        // Removed, not just hidden.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_lru_eviction_respects_access() {
        let clock = clock();
        let cache = cache(2, clock.clone());
        cache.set("a".into(), result("a"), Duration::from_secs(60));
        clock.advance(chrono::Duration::seconds(1));
        cache.set("b".into(), result("b"), Duration::from_secs(60));
        clock.advance(chrono::Duration::seconds(1));

        assert!(cache.get(&"a".into()).is_some());
        cache.set("c".into(), result("c"), Duration::from_secs(60));

        assert!(cache.get(&"b".into()).is_none());
        assert!(cache.get(&"a".into()).is_some());
        assert!(cache.get(&"c".into()).is_some());
    }

    #[test]
    fn test_overwrite_refreshes_ttl() {
        let clock = clock();
        let cache = cache(2, clock.clone());
        cache.set("k".into(), result("old"), Duration::from_secs(10));
        clock.advance(chrono::Duration::seconds(8));
        cache.set("k".into(), result("new"), Duration::from_secs(10));
        clock.advance(chrono::Duration::seconds(8));

        assert_eq!(cache.get(&"k".into()).unwrap().query_used, "new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hit_rate() {
        let cache = cache(10, clock());
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.set("k".into(), result("q"), Duration::from_secs(60));
        for _ in 0..3 {
            cache.get(&"k".into());
        }
        cache.get(&"other".into());

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.75);
        assert_eq!(stats.max_entries, 10);
        assert_eq!(stats.ttl_seconds, 60);
    }

    #[test]
    fn test_purge_and_clear() {
        let clock = clock();
        let cache = cache(10, clock.clone());
        cache.set("short".into(), result("s"), Duration::from_secs(1));
        cache.set("long".into(), result("l"), Duration::from_secs(100));
        clock.advance(chrono::Duration::seconds(2));

        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_thread_safety() {
        let cache = Arc::new(cache(50, clock()));
        let mut handles = vec![];

        for i in 0..8 {
            let cache_clone = cache.clone();
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = CacheKey::from(format!("key_{}_{}", i, j % 20).as_str());
                    cache_clone.set(key.clone(), result("q"), Duration::from_secs(60));
                    cache_clone.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.entries <= 50);
        assert_eq!(stats.hits + stats.misses, 800);
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::new("project: TEST", "updated", "desc", 50, 0);
        let b = CacheKey::new("project: TEST", "updated", "desc", 50, 0);
        let c = CacheKey::new("project: TEST", "updated", "desc", 50, 50);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_parts_cannot_bleed_together() {
        let a = CacheKey::new("project: P|sort=x", "y", "desc", 50, 0);
        let b = CacheKey::new("project: P", "x|sort=y", "desc", 50, 0);
        assert_ne!(a, b);

        let a = CacheKey::new("q|1:", "a", "asc", 1, 0);
        let b = CacheKey::new("q", "1:|1:a", "asc", 1, 0);
        assert_ne!(a, b);
    }
}
