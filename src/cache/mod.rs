//! Bounded LRU Cache
//!
//! Generic capacity-bounded cache with hit/miss/eviction accounting.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         LruCache<K, V>                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────┐     ┌──────────────────────────┐  │
//! │  │ DashMap<K, V>         │     │ Mutex<RecencyIndex<K>>   │  │
//! │  │ (concurrent values)   │◀────│ (touch order, eviction)  │  │
//! │  └───────────────────────┘     └──────────────────────────┘  │
//! │              │                                                │
//! │        CacheMetrics (hits / misses / evictions)               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod lru;
mod metrics;
mod proptest;

pub use lru::LruCache;
pub use metrics::{CacheMetrics, CacheStats, CacheStatsSource};
