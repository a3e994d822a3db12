//! Entity Store
//!
//! Concurrent keyed registry of records plus a ranking index grouped by the
//! rounded metric.
//!
//! # Design
//!
//! - Records live in a `DashMap` keyed by id: concurrent reads and writes
//!   across distinct keys, no cross-key atomicity
//! - The ranking index is a `BTreeMap` ordered descending by bucket key,
//!   guarded by its own mutex
//! - Every reindex scans all buckets to purge the record's old membership.
//!   This is O(buckets x bucket size) and serializes ranking updates; it is
//!   the known bottleneck of the store
//! - Reindexing re-reads the record from the value map while holding the
//!   ranking lock, so racing writers to the same id converge on whichever
//!   value the map holds last

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::record::{Record, ScoreEntry};

/// One ranking bucket: every record whose metric rounds to `metric`
#[derive(Debug, Clone)]
pub struct RankingBucket {
    /// Bucket metric rounded to two decimals
    pub metric: f64,
    /// Records currently in the bucket
    pub records: Vec<Arc<Record>>,
}

type RankingIndex = BTreeMap<Reverse<i64>, Vec<Arc<Record>>>;

/// Concurrent record store with a live ranking index
#[derive(Default)]
pub struct EntityStore {
    /// Records by id
    records: DashMap<String, Arc<Record>>,
    /// Ranking buckets keyed by metric in hundredths, highest first
    rankings: Mutex<RankingIndex>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a record and recompute its ranking bucket
    pub fn put(&self, record: Record) -> Arc<Record> {
        let id = record.id.clone();
        let record = Arc::new(record);
        self.records.insert(id.clone(), Arc::clone(&record));
        self.reindex(&id);
        record
    }

    /// Look up a record by id
    pub fn get(&self, id: &str) -> Option<Arc<Record>> {
        self.records.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Apply a mutation to an existing record and recompute its ranking.
    ///
    /// `mutate` runs on a private copy with no store lock held, so it may
    /// read the store. If another writer replaces the record first, the
    /// copy is discarded and `mutate` runs again on the newer value.
    ///
    /// Returns the updated record, or `None` if the id is unknown.
    pub fn update<F>(&self, id: &str, mut mutate: F) -> Option<Arc<Record>>
    where
        F: FnMut(&mut Record),
    {
        loop {
            let current = self.get(id)?;
            let mut record = (*current).clone();
            mutate(&mut record);
            // The id is the map key; a mutation must not move the record.
            record.id = id.to_string();
            let record = Arc::new(record);

            {
                let mut slot = self.records.get_mut(id)?;
                if !Arc::ptr_eq(slot.value(), &current) {
                    debug!(id, "Concurrent update detected, retrying");
                    continue;
                }
                *slot = Arc::clone(&record);
            }

            self.reindex(id);
            return Some(record);
        }
    }

    /// Append a score entry to a record's history
    pub fn add_score(&self, id: &str, entry: ScoreEntry) -> Option<Arc<Record>> {
        self.update(id, |record| record.grades.push(entry.clone()))
    }

    /// Remove a record from the store and the ranking index
    pub fn remove(&self, id: &str) -> Option<Arc<Record>> {
        let removed = self.records.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            self.reindex(id);
        }
        removed
    }

    /// Point-in-time copy of all records.
    ///
    /// Weakly consistent: concurrent writers may or may not be reflected.
    pub fn snapshot_all(&self) -> Vec<Arc<Record>> {
        self.records.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Consistent copy of all ranking buckets, highest metric first.
    ///
    /// Blocks concurrent ranking updates while the copy is taken.
    pub fn ranking_snapshot(&self) -> Vec<RankingBucket> {
        let rankings = self.rankings.lock();
        rankings
            .iter()
            .map(|(Reverse(key), records)| RankingBucket {
                metric: *key as f64 / 100.0,
                records: records.clone(),
            })
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Purge stale bucket membership for `id` and re-insert its current value
    fn reindex(&self, id: &str) {
        let mut rankings = self.rankings.lock();

        for bucket in rankings.values_mut() {
            bucket.retain(|r| r.id != id);
        }
        rankings.retain(|_, bucket| !bucket.is_empty());

        if let Some(current) = self.get(id) {
            let key = current.ranking_key();
            debug!(id, bucket = key, "Reindexed record");
            rankings.entry(Reverse(key)).or_default().push(current);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(id: &str, scores: &[f64]) -> Record {
        scores.iter().enumerate().fold(
            Record::new(id, format!("Name {}", id)),
            |record, (i, score)| {
                record.with_score(ScoreEntry::new(format!("C{}", i), "Course", *score))
            },
        )
    }

    fn bucket_count_for(store: &EntityStore, id: &str) -> usize {
        store
            .ranking_snapshot()
            .iter()
            .map(|b| b.records.iter().filter(|r| r.id == id).count())
            .sum()
    }

    #[test]
    fn test_put_get() {
        let store = EntityStore::new();
        store.put(make_record("STU0001", &[90.0, 80.0]));

        let record = store.get("STU0001").unwrap();
        assert_eq!(record.metric(), 85.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = EntityStore::new();
        assert!(store.get("nope").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_replaces_and_moves_bucket() {
        let store = EntityStore::new();
        store.put(make_record("STU0001", &[50.0]));
        store.put(make_record("STU0001", &[95.0]));

        assert_eq!(store.get("STU0001").unwrap().metric(), 95.0);
        assert_eq!(bucket_count_for(&store, "STU0001"), 1);

        let buckets = store.ranking_snapshot();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].metric, 95.0);
    }

    #[test]
    fn test_ranking_descending_order() {
        let store = EntityStore::new();
        store.put(make_record("a", &[70.0]));
        store.put(make_record("b", &[90.0]));
        store.put(make_record("c", &[80.0]));
        store.put(make_record("d", &[90.0]));

        let buckets = store.ranking_snapshot();
        let metrics: Vec<f64> = buckets.iter().map(|b| b.metric).collect();
        assert_eq!(metrics, vec![90.0, 80.0, 70.0]);
        assert_eq!(buckets[0].records.len(), 2);
    }

    #[test]
    fn test_add_score_updates_ranking() {
        let store = EntityStore::new();
        store.put(make_record("STU0001", &[60.0]));

        let updated = store
            .add_score("STU0001", ScoreEntry::new("BIO110", "Biology", 100.0))
            .unwrap();
        assert_eq!(updated.metric(), 80.0);

        let buckets = store.ranking_snapshot();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].metric, 80.0);
        assert_eq!(bucket_count_for(&store, "STU0001"), 1);
    }

    #[test]
    fn test_update_missing_returns_none() {
        let store = EntityStore::new();
        assert!(store.update("ghost", |r| r.name.clear()).is_none());
        assert!(store.ranking_snapshot().is_empty());
    }

    #[test]
    fn test_update_cannot_change_id() {
        let store = EntityStore::new();
        store.put(make_record("STU0001", &[60.0]));
        let updated = store
            .update("STU0001", |r| r.id = "other".to_string())
            .unwrap();
        assert_eq!(updated.id, "STU0001");
        assert!(store.get("other").is_none());
    }

    #[test]
    fn test_update_closure_may_read_store() {
        let store = EntityStore::new();
        store.put(make_record("STU0001", &[60.0]));
        store.put(make_record("STU0002", &[90.0]));

        let updated = store
            .update("STU0001", |r| {
                let own = store.get("STU0001").unwrap();
                let peer = store.get("STU0002").unwrap();
                r.name = format!("{} / {}", own.name, peer.name);
            })
            .unwrap();

        assert_eq!(updated.name, "Name STU0001 / Name STU0002");
        assert_eq!(store.get("STU0001").unwrap().name, updated.name);
    }

    #[test]
    fn test_concurrent_add_score_loses_nothing() {
        use std::thread;

        let store = Arc::new(EntityStore::new());
        store.put(make_record("STU0001", &[]));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        let score = ((t * 50 + i) % 100) as f64;
                        let entry = ScoreEntry::new("MAT101", "Mathematics", score);
                        store.add_score("STU0001", entry);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("STU0001").unwrap().grades.len(), 400);
        assert_eq!(bucket_count_for(&store, "STU0001"), 1);
    }

    #[test]
    fn test_remove_purges_ranking() {
        let store = EntityStore::new();
        store.put(make_record("STU0001", &[60.0]));
        store.put(make_record("STU0002", &[70.0]));

        assert!(store.remove("STU0001").is_some());
        assert!(store.remove("STU0001").is_none());
        assert_eq!(bucket_count_for(&store, "STU0001"), 0);
        assert_eq!(store.ranking_snapshot().len(), 1);
    }

    #[test]
    fn test_rounded_buckets_group_close_metrics() {
        let store = EntityStore::new();
        // 77.333 and 77.334 both round to 77.33
        store.put(make_record("a", &[70.0, 80.0, 82.0]));
        store.put(make_record("b", &[77.334]));

        let buckets = store.ranking_snapshot();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].metric, 77.33);
        assert_eq!(buckets[0].records.len(), 2);
    }

    #[test]
    fn test_concurrent_puts_keep_single_membership() {
        use std::thread;

        let store = Arc::new(EntityStore::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("rec-{}", i % 20);
                        store.put(make_record(&id, &[(t * 10 + i % 7) as f64]));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 20);
        let buckets = store.ranking_snapshot();
        let total: usize = buckets.iter().map(|b| b.records.len()).sum();
        assert_eq!(total, 20);

        // Every bucket entry matches the record's current value
        for bucket in &buckets {
            for record in &bucket.records {
                let current = store.get(&record.id).unwrap();
                assert_eq!(current.ranking_key() as f64 / 100.0, bucket.metric);
            }
        }
    }
}
