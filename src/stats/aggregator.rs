//! Stats Aggregator
//!
//! Periodically summarizes the entity store and cache counters into a shared
//! snapshot for dashboards.
//!
//! Each field of the snapshot is published with its own atomic store. A
//! reader racing a compute cycle may see a mix of old and new fields.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::audit::AuditLogger;
use crate::cache::CacheStatsSource;
use crate::error::{Error, Result};
use crate::scheduler::PeriodicScheduler;
use crate::store::EntityStore;

/// Scheduler name the aggregator registers under
pub const STATS_TASK_NAME: &str = "stats-aggregator";

const AUDIT_OPERATION: &str = "StatsCalc";

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable copy of the latest published stats
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Mean metric across all records
    #[serde(rename = "averageGPA")]
    pub average_metric: f64,
    /// Number of records in the store
    #[serde(rename = "totalStudents")]
    pub total_records: u64,
    /// When the last successful cycle published
    pub last_update: Option<DateTime<Utc>>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl StatsSnapshot {
    /// Key/value view consumed by dashboards and the CLI.
    ///
    /// Always carries `averageGPA`, `totalStudents`, `lastUpdate`,
    /// `cacheHits` and `cacheMisses`; `lastUpdate` is null until the first
    /// cycle completes.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let last_update = self
            .last_update
            .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::Null);

        BTreeMap::from([
            ("averageGPA".to_string(), json!(self.average_metric)),
            ("totalStudents".to_string(), json!(self.total_records)),
            ("lastUpdate".to_string(), last_update),
            ("cacheHits".to_string(), json!(self.cache_hits)),
            ("cacheMisses".to_string(), json!(self.cache_misses)),
        ])
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Background statistics calculator
pub struct StatsAggregator {
    store: Arc<EntityStore>,
    cache: Arc<dyn CacheStatsSource>,
    audit: Option<Arc<AuditLogger>>,

    // Published fields
    average_bits: AtomicU64,
    total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    last_update: RwLock<Option<DateTime<Utc>>>,

    paused: AtomicBool,
    loading: AtomicBool,
    scheduler: Mutex<Option<Arc<PeriodicScheduler>>>,
}

/// Clears the loading flag when a compute cycle ends, however it ends
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StatsAggregator {
    /// Create an aggregator over `store` and `cache`
    pub fn new(
        store: Arc<EntityStore>,
        cache: Arc<dyn CacheStatsSource>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache,
            audit,
            average_bits: AtomicU64::new(0f64.to_bits()),
            total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            last_update: RwLock::new(None),
            paused: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            scheduler: Mutex::new(None),
        })
    }

    /// Run `compute` immediately and then every `interval` on `scheduler`
    pub fn start(
        self: &Arc<Self>,
        scheduler: Arc<PeriodicScheduler>,
        interval: Duration,
    ) -> Result<()> {
        let aggregator = Arc::clone(self);
        scheduler.schedule_at_fixed_rate(
            STATS_TASK_NAME,
            move || {
                let aggregator = Arc::clone(&aggregator);
                async move {
                    // Failures are already audited by compute
                    if let Err(e) = aggregator.compute() {
                        debug!(error = %e, "Stats cycle failed");
                    }
                    Ok(())
                }
            },
            Duration::ZERO,
            interval,
        )?;

        info!(?interval, "Stats aggregator started");
        *self.scheduler.lock() = Some(scheduler);
        Ok(())
    }

    /// Stop future compute cycles
    pub fn stop(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.cancel(STATS_TASK_NAME);
            info!("Stats aggregator stopped");
        }
    }

    /// Check if periodic cycles are scheduled
    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .map(|s| !s.is_shutdown() && s.is_scheduled(STATS_TASK_NAME))
            .unwrap_or(false)
    }

    /// Run one compute cycle. A paused aggregator returns immediately
    #[instrument(skip(self))]
    pub fn compute(&self) -> Result<()> {
        if self.is_paused() {
            debug!("Stats paused, skipping cycle");
            return Ok(());
        }

        self.loading.store(true, Ordering::SeqCst);
        let _loading = LoadingGuard(&self.loading);

        match self.publish() {
            Ok(()) => {
                if let Some(audit) = &self.audit {
                    audit.log(AUDIT_OPERATION, "Computed stats", 0, true);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to compute stats");
                if let Some(audit) = &self.audit {
                    audit.log(
                        AUDIT_OPERATION,
                        &format!("Failed to compute stats: {}", e),
                        0,
                        false,
                    );
                }
                Err(e)
            }
        }
    }

    fn publish(&self) -> Result<()> {
        let records = self.store.snapshot_all();
        let average = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.metric()).sum::<f64>() / records.len() as f64
        };
        if !average.is_finite() {
            return Err(Error::Internal(format!(
                "average metric is not finite ({})",
                average
            )));
        }

        let cache = self.cache.cache_stats();

        self.average_bits.store(average.to_bits(), Ordering::Release);
        self.total.store(records.len() as u64, Ordering::Release);
        *self.last_update.write() = Some(Utc::now());
        self.cache_hits.store(cache.hits, Ordering::Release);
        self.cache_misses.store(cache.misses, Ordering::Release);

        debug!(average, total = records.len(), "Published stats");
        Ok(())
    }

    /// Skip cycles until `resume`. A cycle already running completes
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Check if a compute cycle is executing right now
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Copy of the latest published fields
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            average_metric: f64::from_bits(self.average_bits.load(Ordering::Acquire)),
            total_records: self.total.load(Ordering::Acquire),
            last_update: *self.last_update.read(),
            cache_hits: self.cache_hits.load(Ordering::Acquire),
            cache_misses: self.cache_misses.load(Ordering::Acquire),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditConfig;
    use crate::cache::{CacheStats, LruCache};
    use crate::store::{Record, ScoreEntry};
    use assert_matches::assert_matches;

    fn record(id: &str, scores: &[f64]) -> Record {
        scores.iter().fold(Record::new(id, id), |r, s| {
            r.with_score(ScoreEntry::new("MAT101", "Mathematics", *s))
        })
    }

    fn fixture() -> (Arc<EntityStore>, Arc<LruCache<String, u32>>, Arc<StatsAggregator>) {
        let store = Arc::new(EntityStore::new());
        let cache = Arc::new(LruCache::new(4).unwrap());
        let aggregator = StatsAggregator::new(Arc::clone(&store), cache.clone(), None);
        (store, cache, aggregator)
    }

    // =========================================================================
    // Compute
    // =========================================================================

    #[test]
    fn test_initial_snapshot() {
        let (_, _, aggregator) = fixture();
        let snapshot = aggregator.snapshot();

        assert_eq!(snapshot.average_metric, 0.0);
        assert_eq!(snapshot.total_records, 0);
        assert!(snapshot.last_update.is_none());
        assert!(!aggregator.is_loading());
    }

    #[test]
    fn test_compute_publishes_fields() {
        let (store, cache, aggregator) = fixture();
        store.put(record("STU0001", &[80.0, 90.0]));
        store.put(record("STU0002", &[70.0]));
        cache.put("a".to_string(), 1);
        cache.get(&"a".to_string());
        cache.get(&"missing".to_string());
        cache.get(&"missing".to_string());

        aggregator.compute().unwrap();
        let snapshot = aggregator.snapshot();

        assert_eq!(snapshot.average_metric, 77.5);
        assert_eq!(snapshot.total_records, 2);
        assert!(snapshot.last_update.is_some());
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert!(!aggregator.is_loading());
    }

    /// Cache source that parks inside `cache_stats` until released
    struct GatedCache {
        entered: std::sync::Barrier,
        release: std::sync::Barrier,
    }

    impl CacheStatsSource for GatedCache {
        fn cache_stats(&self) -> CacheStats {
            self.entered.wait();
            self.release.wait();
            CacheStats {
                size: 0,
                capacity: 1,
                hits: 3,
                misses: 1,
                evictions: 0,
                hit_ratio: 0.75,
            }
        }
    }

    #[test]
    fn test_loading_flag_set_while_cycle_runs() {
        let store = Arc::new(EntityStore::new());
        store.put(record("STU0001", &[70.0]));
        let gate = Arc::new(GatedCache {
            entered: std::sync::Barrier::new(2),
            release: std::sync::Barrier::new(2),
        });
        let aggregator = StatsAggregator::new(store, gate.clone(), None);

        let worker = {
            let aggregator = Arc::clone(&aggregator);
            std::thread::spawn(move || aggregator.compute())
        };

        gate.entered.wait();
        assert!(aggregator.is_loading());
        assert!(aggregator.snapshot().last_update.is_none());
        gate.release.wait();

        worker.join().unwrap().unwrap();
        assert!(!aggregator.is_loading());
        assert_eq!(aggregator.snapshot().cache_hits, 3);
    }

    #[test]
    fn test_paused_cycle_is_skipped() {
        let (store, _, aggregator) = fixture();
        store.put(record("STU0001", &[95.0]));

        aggregator.pause();
        assert!(aggregator.is_paused());
        aggregator.compute().unwrap();
        assert_eq!(aggregator.snapshot().total_records, 0);

        aggregator.resume();
        aggregator.compute().unwrap();
        assert_eq!(aggregator.snapshot().total_records, 1);
    }

    #[test]
    fn test_non_finite_average_fails_and_keeps_previous() {
        let (store, _, aggregator) = fixture();
        store.put(record("STU0001", &[60.0]));
        aggregator.compute().unwrap();

        store.put(record("STU0002", &[f64::NAN]));
        assert_matches!(aggregator.compute(), Err(Error::Internal(_)));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.average_metric, 60.0);
        assert_eq!(snapshot.total_records, 1);
        assert!(!aggregator.is_loading());
    }

    #[test]
    fn test_to_map_keys() {
        let (store, _, aggregator) = fixture();
        store.put(record("STU0001", &[88.0]));
        aggregator.compute().unwrap();

        let map = aggregator.snapshot().to_map();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["averageGPA", "cacheHits", "cacheMisses", "lastUpdate", "totalStudents"]
        );
        assert_eq!(map["averageGPA"], json!(88.0));
        assert_eq!(map["totalStudents"], json!(1));
        assert!(map["lastUpdate"].is_string());
    }

    #[test]
    fn test_snapshot_serializes_with_dashboard_keys() {
        let (_, _, aggregator) = fixture();
        let value = serde_json::to_value(aggregator.snapshot()).unwrap();
        assert!(value.get("averageGPA").is_some());
        assert!(value.get("totalStudents").is_some());
        assert!(value.get("lastUpdate").is_some());
        assert!(value.get("cacheHits").is_some());
        assert!(value.get("cacheMisses").is_some());
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_and_stop() {
        let (store, _, aggregator) = fixture();
        let scheduler = Arc::new(PeriodicScheduler::default());
        store.put(record("STU0001", &[75.0]));

        aggregator
            .start(Arc::clone(&scheduler), Duration::from_millis(30))
            .unwrap();
        assert!(aggregator.is_running());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(aggregator.snapshot().total_records, 1);

        store.put(record("STU0002", &[85.0]));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(aggregator.snapshot().total_records, 2);

        aggregator.stop();
        assert!(!aggregator.is_running());
        assert!(!scheduler.is_scheduled(STATS_TASK_NAME));

        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cycles_are_audited() {
        let dir = tempfile::TempDir::new().unwrap();
        let audit = AuditLogger::start(AuditConfig::new(dir.path().join("audit.log")));
        let store = Arc::new(EntityStore::new());
        let cache: Arc<LruCache<String, u32>> = Arc::new(LruCache::new(2).unwrap());
        let aggregator = StatsAggregator::new(Arc::clone(&store), cache, Some(Arc::clone(&audit)));

        aggregator.compute().unwrap();
        store.put(record("STU0001", &[f64::NAN]));
        let _ = aggregator.compute();
        audit.shutdown().await;

        let contents = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("| StatsCalc | Computed stats | 0ms | SUCCESS"));
        assert!(lines[1].contains("| StatsCalc | Failed to compute stats: "));
        assert!(lines[1].ends_with("| FAIL"));
    }
}
