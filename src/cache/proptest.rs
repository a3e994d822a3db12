//! Property-Based Tests for the LRU Cache
//!
//! # Test Properties
//!
//! 1. **Capacity Bound**: inserting N+k distinct keys leaves exactly N resident
//! 2. **Eviction Count**: exactly k evictions are recorded
//! 3. **Retention**: the N most recently inserted keys survive
//! 4. **Hit Neutrality**: hits never change the resident size

#![cfg(test)]

use proptest::prelude::*;

use super::lru::LruCache;

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for (capacity, overflow) pairs
fn capacity_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=32, 0usize..=64)
}

// =============================================================================
// Capacity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: N+k distinct inserts leave N resident, k evicted, newest N kept.
    #[test]
    fn prop_capacity_and_eviction_count((capacity, overflow) in capacity_strategy()) {
        let cache = LruCache::new(capacity).unwrap();
        let total = capacity + overflow;

        for i in 0..total {
            cache.put(i, i * 10);
        }

        prop_assert_eq!(cache.size(), capacity);
        prop_assert_eq!(cache.evictions(), overflow as u64);

        for i in 0..total {
            prop_assert_eq!(cache.contains(&i), i >= overflow);
        }
    }

    /// Property: hits on resident keys never change the size or eviction count.
    #[test]
    fn prop_hits_do_not_resize(
        (capacity, overflow) in capacity_strategy(),
        lookups in prop::collection::vec(0usize..96, 0..50),
    ) {
        let cache = LruCache::new(capacity).unwrap();
        for i in 0..capacity + overflow {
            cache.put(i, i);
        }
        let size_before = cache.size();
        let evictions_before = cache.evictions();

        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;
        for key in &lookups {
            match cache.get(key) {
                Some(value) => {
                    prop_assert_eq!(value, *key);
                    expected_hits += 1;
                }
                None => expected_misses += 1,
            }
        }

        prop_assert_eq!(cache.size(), size_before);
        prop_assert_eq!(cache.evictions(), evictions_before);
        prop_assert_eq!(cache.hits(), expected_hits);
        prop_assert_eq!(cache.misses(), expected_misses);
    }
}
