//! Tag value cache: LRU eviction bounded by capacity, per-entry TTL
//! expiry, and four atomic counters (hits/misses/evictions/expirations)
//! surfaced through diagnostics.
//!
//! Lock discipline: the global map lock is always acquired before any
//! per-entry work; entries never hold a lock across an `.await`, so there
//! is no cross-lock ordering to get wrong in practice, but the convention
//! (global before entry) is kept for when that changes.

use gw_protocol::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
    /// Logical clock tick of the last access, used to find the LRU
    /// candidate on eviction without maintaining a separate ordered list.
    last_access: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// An LRU+TTL cache of tag values, keyed by `"{device_id}:{tag_id}"`.
pub struct TagCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    default_ttl: Duration,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl TagCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        TagCache {
            entries: RwLock::new(HashMap::new()),
            capacity,
            default_ttl,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Reads a value, returning `None` on a miss or an expired entry (the
    /// expired entry is removed as a side effect).
    pub fn get(&self, key: &str) -> Option<Value> {
        let tick = self.next_tick();
        let mut entries = self.lock_write();
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let entry = entries.get_mut(key).expect("checked above");
        entry.last_access = tick;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Inserts or overwrites a value with the cache's default TTL.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    pub fn put_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let tick = self.next_tick();
        let mut entries = self.lock_write();
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                last_access: tick,
            },
        );
        self.evict_over_capacity(&mut entries);
    }

    fn evict_over_capacity(&self, entries: &mut HashMap<String, CacheEntry>) {
        while entries.len() > self.capacity {
            let lru_key = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            let Some(lru_key) = lru_key else { break };
            entries.remove(&lru_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %lru_key, "cache entry evicted over capacity");
        }
    }

    /// Removes a single entry, e.g. after a successful write (spec's
    /// write-then-invalidate contract).
    pub fn invalidate(&self, key: &str) {
        self.lock_write().remove(key);
    }

    /// Removes every expired entry. Intended to run on a periodic
    /// background tick so TTL expiry doesn't depend on read traffic.
    pub fn sweep(&self) {
        let mut entries = self.lock_write();
        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        let swept = expired_keys.len();
        for key in expired_keys {
            entries.remove(&key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        if swept > 0 {
            tracing::debug!(swept, "cache sweep removed expired entries");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
