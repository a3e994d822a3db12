//! LRU Cache - Bounded Least-Recently-Used Cache
//!
//! # Design
//!
//! - Values live in a `DashMap`, so lookups of distinct keys never contend
//! - A single recency index, guarded by one mutex, orders keys by last touch.
//!   Only recency updates, evictions and removals take that lock
//! - Eviction is two-step: the eldest key is dropped from the recency index,
//!   then from the value map. A concurrent `get` may still see the value in
//!   between; that grace window is part of the cache's contract
//! - The recency index may briefly track a key the value map has already
//!   dropped (a racing `get` re-touching an evicted key); the next eviction
//!   pass discards it

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::metrics::{CacheMetrics, CacheStats, CacheStatsSource};
use crate::error::{Error, Result};

/// Last touch of a key
#[derive(Debug, Clone, Copy)]
struct Touch {
    /// Monotonic touch sequence, orders the recency index
    tick: u64,
    /// Wall-clock time of the touch
    at: DateTime<Utc>,
}

/// Keys ordered by last touch, oldest first
#[derive(Debug)]
struct RecencyIndex<K> {
    order: BTreeMap<u64, K>,
    touched: HashMap<K, Touch>,
    next_tick: u64,
}

impl<K: Eq + Hash + Clone> RecencyIndex<K> {
    fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            touched: HashMap::new(),
            next_tick: 0,
        }
    }

    fn touch(&mut self, key: K) {
        let touch = Touch {
            tick: self.next_tick,
            at: Utc::now(),
        };
        self.next_tick += 1;

        if let Some(previous) = self.touched.insert(key.clone(), touch) {
            self.order.remove(&previous.tick);
        }
        self.order.insert(touch.tick, key);
    }

    fn pop_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.touched.remove(&key);
        Some(key)
    }

    fn remove(&mut self, key: &K) {
        if let Some(touch) = self.touched.remove(key) {
            self.order.remove(&touch.tick);
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.touched.clear();
    }

    fn len(&self) -> usize {
        self.touched.len()
    }

    fn snapshot(&self) -> Vec<(K, DateTime<Utc>)> {
        self.order
            .values()
            .filter_map(|key| self.touched.get(key).map(|t| (key.clone(), t.at)))
            .collect()
    }
}

/// Bounded LRU cache with hit/miss/eviction counters
pub struct LruCache<K, V> {
    /// Maximum number of resident entries
    capacity: usize,
    /// Value storage
    store: DashMap<K, V>,
    /// Recency index
    recency: Mutex<RecencyIndex<K>>,
    /// Counters
    metrics: CacheMetrics,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// Fails with [`Error::InvalidConfig`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "cache capacity must be > 0".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            store: DashMap::new(),
            recency: Mutex::new(RecencyIndex::new()),
            metrics: CacheMetrics::new(),
        })
    }

    /// Get a value, refreshing its recency on a hit
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.store.get(key).map(|v| v.value().clone());

        match &value {
            Some(_) => {
                self.metrics.record_hit();
                self.recency.lock().touch(key.clone());
            }
            None => self.metrics.record_miss(),
        }

        value
    }

    /// Insert or overwrite a value, then evict least-recently-touched
    /// entries until the cache is back within capacity
    pub fn put(&self, key: K, value: V) {
        self.store.insert(key.clone(), value);

        let mut recency = self.recency.lock();
        recency.touch(key);

        while recency.len() > self.capacity {
            let Some(eldest) = recency.pop_oldest() else {
                break;
            };
            if self.store.remove(&eldest).is_some() {
                self.metrics.record_eviction();
            }
        }
    }

    /// Remove a single entry
    pub fn invalidate(&self, key: &K) {
        // Value map is mutated under the recency lock so a racing `put`
        // cannot leave a resident key the index no longer tracks
        let mut recency = self.recency.lock();
        recency.remove(key);
        self.store.remove(key);
    }

    /// Remove all entries. Counters are kept
    pub fn clear(&self) {
        let mut recency = self.recency.lock();
        recency.clear();
        self.store.clear();
    }

    /// Check if a key is resident without touching counters or recency
    pub fn contains(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    /// Keys ordered oldest-touched first, with their last-touch time
    pub fn snapshot_access_order(&self) -> Vec<(K, DateTime<Utc>)> {
        self.recency.lock().snapshot()
    }

    /// Number of resident entries
    pub fn size(&self) -> usize {
        self.store.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.metrics.hits()
    }

    pub fn misses(&self) -> u64 {
        self.metrics.misses()
    }

    pub fn evictions(&self) -> u64 {
        self.metrics.evictions()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.size(),
            capacity: self.capacity,
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            hit_ratio: self.metrics.hit_ratio(),
        }
    }
}

impl<K, V> fmt::Debug for LruCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("size", &self.store.len())
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl<K, V> CacheStatsSource for LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn cache_stats(&self) -> CacheStats {
        self.stats()
    }
}

// =============================================================================
// Tests
// =============================================================================
