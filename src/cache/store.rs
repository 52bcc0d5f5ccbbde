use std::{
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub const METRIC_CACHE_HIT: &str = "morpho_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "morpho_cache_miss_total";
pub const METRIC_CACHE_STORE: &str = "morpho_cache_store_total";
pub const METRIC_CACHE_EVICT: &str = "morpho_cache_evict_total";

struct CachedEntry {
    body: Bytes,
    stored_at: Instant,
}

/// Point-in-time counters of one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
}

/// Serialized responses keyed by request path.
///
/// Values are immutable `Bytes`; readers get a cheap clone and never observe a
/// partially written entry. Concurrent writers to the same path resolve to the
/// last one.
pub struct PathCache {
    entries: RwLock<LruCache<String, CachedEntry>>,
    ttl: Option<Duration>,
    counters: Counters,
}

impl PathCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            ttl: config.ttl,
            counters: Counters::default(),
        }
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        // LRU reads reorder entries, so lookups take the write lock.
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(path) {
            Some(entry) if !self.is_expired(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_HIT).increment(1);
                return Some(entry.body.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(path);
            debug!(target: "morpho::cache", path, "dropped expired entry");
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS).increment(1);
        None
    }

    /// Store `body` under `path`, replacing any previous entry.
    pub fn put(&self, path: impl Into<String>, body: Bytes) {
        let path = path.into();
        let entry = CachedEntry {
            body,
            stored_at: Instant::now(),
        };

        let displaced = rw_write(&self.entries, SOURCE, "put").push(path.clone(), entry);
        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_STORE).increment(1);

        if let Some((evicted, _)) = displaced
            && evicted != path
        {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CACHE_EVICT).increment(1);
            debug!(target: "morpho::cache", path = %evicted, "evicted entry at capacity");
        }
    }

    pub fn invalidate(&self, path: &str) -> bool {
        rw_write(&self.entries, SOURCE, "invalidate").pop(path).is_some()
    }

    /// Drop every entry whose path starts with `prefix`; returns how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_prefix");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &doomed {
            entries.pop(path);
        }
        doomed.len()
    }

    pub fn invalidate_all(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_all");
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &CachedEntry) -> bool {
        self.ttl.is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
    }
}
