//! Bounded LRU cache for version-store lookups (component E.1).

use std::collections::HashMap;
use std::sync::Mutex;

/// Default capacity used when a non-positive `max_size` is configured.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Cache hit/miss counters. Monotonic until [`LruCache::clear`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of `get` calls that found an entry.
    pub hits: u64,
    /// Number of `get` calls that found nothing.
    pub misses: u64,
}

struct Entry<V> {
    value: V,
    // position in `order`; kept in sync on every touch
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    order: Vec<String>,
    max_size: usize,
    stats: CacheStats,
}

impl<V> Inner<V> {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn evict_if_needed(&mut self) {
        while self.map.len() > self.max_size {
            if self.order.is_empty() {
                break;
            }
            let oldest = self.order.remove(0);
            self.map.remove(&oldest);
        }
    }
}

/// A bounded, thread-safe, least-recently-used cache keyed by DN.
pub struct LruCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> LruCache<V> {
    /// Construct a cache. `max_size <= 0` uses [`DEFAULT_MAX_SIZE`].
    pub fn new(max_size: i64) -> Self {
        let max_size = if max_size <= 0 {
            DEFAULT_MAX_SIZE
        } else {
            max_size as usize
        };
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: Vec::new(),
                max_size,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Fetch a value, marking it most-recently-used on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        if inner.map.contains_key(key) {
            inner.touch(key);
            inner.stats.hits += 1;
            inner.map.get(key).map(|e| e.value.clone())
        } else {
            inner.stats.misses += 1;
            None
        }
    }

    /// Insert or overwrite a value, evicting the least-recently-used
    /// entry if the cache is at capacity.
    pub fn put(&self, key: String, value: V) {
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        if inner.map.contains_key(&key) {
            inner.touch(&key);
        } else {
            inner.order.push(key.clone());
        }
        inner.map.insert(key, Entry { value });
        inner.evict_if_needed();
    }

    /// Remove an entry, if present.
    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        if inner.map.remove(key).is_some() {
            inner.order.retain(|k| k != key);
        }
    }

    /// Drop all entries and reset the hit/miss counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        inner.map.clear();
        inner.order.clear();
        inner.stats = CacheStats::default();
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru cache lock poisoned").map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().expect("lru cache lock poisoned").stats
    }
}
