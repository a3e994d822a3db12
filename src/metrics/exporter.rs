//! Prometheus Exporter
//!
//! Mirrors the stats snapshot, cache counters and audit writer state into a
//! dedicated registry and renders it in the text exposition format.

use std::sync::Arc;

use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};

use crate::audit::AuditLogger;
use crate::cache::{CacheStats, CacheStatsSource};
use crate::error::{Error, Result};
use crate::stats::{StatsAggregator, StatsSnapshot};

/// Gauges exported on `/metrics`
pub struct StatsExporter {
    registry: Registry,

    average_metric: Gauge,
    records: IntGauge,
    last_update: Gauge,

    cache_size: IntGauge,
    cache_capacity: IntGauge,
    cache_hits: IntGauge,
    cache_misses: IntGauge,
    cache_evictions: IntGauge,
    cache_hit_ratio: Gauge,

    audit_pending: IntGauge,
    audit_written: IntGauge,
    audit_lost: IntGauge,
}

impl StatsExporter {
    /// Create an exporter with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let exporter = Self {
            average_metric: Gauge::new(
                "gradebook_average_gpa",
                "Mean metric across all records at the last stats cycle",
            )?,
            records: IntGauge::new(
                "gradebook_records",
                "Records in the store at the last stats cycle",
            )?,
            last_update: Gauge::new(
                "gradebook_stats_last_update_timestamp_seconds",
                "Unix time of the last successful stats cycle",
            )?,
            cache_size: IntGauge::new("gradebook_cache_size", "Resident cache entries")?,
            cache_capacity: IntGauge::new("gradebook_cache_capacity", "Configured cache capacity")?,
            cache_hits: IntGauge::new("gradebook_cache_hits", "Cache hits since start")?,
            cache_misses: IntGauge::new("gradebook_cache_misses", "Cache misses since start")?,
            cache_evictions: IntGauge::new(
                "gradebook_cache_evictions",
                "Cache evictions since start",
            )?,
            cache_hit_ratio: Gauge::new(
                "gradebook_cache_hit_ratio",
                "Cache hit ratio (0.0 - 1.0)",
            )?,
            audit_pending: IntGauge::new(
                "gradebook_audit_pending",
                "Audit entries waiting for a flush",
            )?,
            audit_written: IntGauge::new(
                "gradebook_audit_written",
                "Audit entries written to disk",
            )?,
            audit_lost: IntGauge::new(
                "gradebook_audit_lost",
                "Audit entries dropped by failed flushes",
            )?,
            registry,
        };

        exporter.registry.register(Box::new(exporter.average_metric.clone()))?;
        exporter.registry.register(Box::new(exporter.records.clone()))?;
        exporter.registry.register(Box::new(exporter.last_update.clone()))?;
        exporter.registry.register(Box::new(exporter.cache_size.clone()))?;
        exporter.registry.register(Box::new(exporter.cache_capacity.clone()))?;
        exporter.registry.register(Box::new(exporter.cache_hits.clone()))?;
        exporter.registry.register(Box::new(exporter.cache_misses.clone()))?;
        exporter.registry.register(Box::new(exporter.cache_evictions.clone()))?;
        exporter.registry.register(Box::new(exporter.cache_hit_ratio.clone()))?;
        exporter.registry.register(Box::new(exporter.audit_pending.clone()))?;
        exporter.registry.register(Box::new(exporter.audit_written.clone()))?;
        exporter.registry.register(Box::new(exporter.audit_lost.clone()))?;

        Ok(exporter)
    }

    /// Copy the stats snapshot and cache counters into the gauges
    pub fn update(&self, snapshot: &StatsSnapshot, cache: &CacheStats) {
        self.average_metric.set(snapshot.average_metric);
        self.records.set(snapshot.total_records as i64);
        if let Some(at) = snapshot.last_update {
            self.last_update.set(at.timestamp_millis() as f64 / 1000.0);
        }

        self.cache_size.set(cache.size as i64);
        self.cache_capacity.set(cache.capacity as i64);
        self.cache_hits.set(cache.hits as i64);
        self.cache_misses.set(cache.misses as i64);
        self.cache_evictions.set(cache.evictions as i64);
        self.cache_hit_ratio.set(cache.hit_ratio);
    }

    /// Copy the audit writer counters into the gauges
    pub fn update_audit(&self, audit: &AuditLogger) {
        self.audit_pending.set(audit.pending() as i64);
        self.audit_written.set(audit.written() as i64);
        self.audit_lost.set(audit.lost() as i64);
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metrics output is not UTF-8: {}", e)))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Everything `/metrics` reads from, refreshed on every scrape
#[derive(Clone)]
pub struct MetricsContext {
    pub exporter: Arc<StatsExporter>,
    pub aggregator: Arc<StatsAggregator>,
    pub cache: Arc<dyn CacheStatsSource>,
    pub audit: Option<Arc<AuditLogger>>,
}

impl MetricsContext {
    /// Refresh the gauges and encode them
    pub fn render(&self) -> Result<String> {
        self.exporter
            .update(&self.aggregator.snapshot(), &self.cache.cache_stats());
        if let Some(audit) = &self.audit {
            self.exporter.update_audit(audit);
        }
        self.exporter.encode()
    }
}

// =============================================================================
// Tests
// =============================================================================
