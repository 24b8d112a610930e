//! C1: an in-process LRU cache with per-entry TTL.
//!
//! Grounded on `harborgrid-justin-caddy`'s `enterprise::cache::tier::LruCache`
//! (hit-count/last-access bookkeeping, lazy expiry-on-access, capacity-driven
//! eviction), reshaped from its `DashMap` + `RwLock<Vec<K>>` access-order
//! list into a single `parking_lot::Mutex`-guarded `IndexMap`, whose
//! insertion order IS the LRU order (front = least recently used), so a
//! promotion is an O(1)-amortized move-to-back instead of a linear scan of
//! a separate order vector.

use std::hash::Hash;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Snapshot of cache counters for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

struct Entry<V> {
    value: V,
    deadline: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if now >= d)
    }
}

struct Inner<K, V> {
    map: IndexMap<K, Entry<V>>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// A bounded, thread-safe LRU cache with optional per-entry TTL.
pub struct LocalLruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> LocalLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// # Panics
    /// Panics if `capacity` is zero (capacity > 0 is an invariant).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LocalLruCache capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                map: IndexMap::with_capacity(capacity),
                capacity,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// `ttl = None` (or a zero duration) means no expiry.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let Some(idx) = inner.map.get_index_of(key) else {
            inner.misses += 1;
            return None;
        };

        if inner.map[idx].is_expired(now) {
            inner.map.shift_remove_index(idx);
            inner.misses += 1;
            return None;
        }

        let value = inner.map[idx].value.clone();
        let last = inner.map.len() - 1;
        inner.map.move_index(idx, last);
        inner.hits += 1;
        Some(value)
    }

    pub fn exists(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// `ttl <= 0` (represented here as `None`) means "no expiry".
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut inner = self.inner.lock();
        let deadline = ttl.filter(|d| !d.is_zero()).map(|d| Instant::now() + d);

        if !inner.map.contains_key(&key) {
            while inner.map.len() >= inner.capacity {
                if inner.map.shift_remove_index(0).is_some() {
                    inner.evictions += 1;
                } else {
                    break;
                }
            }
        }

        inner.map.insert(key.clone(), Entry { value, deadline });
        if let Some(idx) = inner.map.get_index_of(&key) {
            let last = inner.map.len() - 1;
            inner.map.move_index(idx, last);
        }
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().map.shift_remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.map.len(),
            capacity: inner.capacity,
        }
    }
}
