//! Gradebook
//!
//! Loads demo records, runs the background stats aggregator, generates
//! per-record reports and serves Prometheus metrics until interrupted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Gradebook                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ EntityStore  │───▶│    Stats     │───▶│  /metrics    │       │
//! │  │ + LruCache   │    │  Aggregator  │    │  Dashboard   │       │
//! │  └──────┬───────┘    └──────────────┘    └──────────────┘       │
//! │         │            ┌──────────────┐    ┌──────────────┐       │
//! │         └───────────▶│   Reports    │───▶│ Audit Logger │       │
//! │                      └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gradebook_core::audit::{AuditConfig, AuditLogger};
use gradebook_core::cache::LruCache;
use gradebook_core::metrics::{self, MetricsContext, StatsExporter};
use gradebook_core::queue::{PriorityTaskQueue, TaskQueueConfig};
use gradebook_core::report::{ConsoleProgress, ProgressListener, ReportGenerator};
use gradebook_core::scheduler::{PeriodicScheduler, SchedulerConfig};
use gradebook_core::stats::{Dashboard, StatsAggregator};
use gradebook_core::store::{EntityStore, Record, RecordSearch, SequenceGenerator};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Gradebook - concurrent record store, stats and report pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audit log file path
    #[arg(long, env = "AUDIT_LOG_PATH", default_value = "gradebook-audit.log")]
    audit_log: PathBuf,

    /// Directory receiving `<id>.report.txt` artifacts
    #[arg(long, env = "REPORT_DIR", default_value = "reports")]
    report_dir: PathBuf,

    /// Record cache capacity
    #[arg(long, env = "CACHE_CAPACITY", default_value = "100")]
    cache_capacity: usize,

    /// Stats aggregation interval in seconds
    #[arg(long, env = "STATS_INTERVAL_SECONDS", default_value = "2")]
    stats_interval_seconds: u64,

    /// Maximum concurrent report jobs
    #[arg(long, env = "REPORT_CONCURRENCY", default_value = "4")]
    report_concurrency: usize,

    /// Task queue worker count
    #[arg(long, env = "QUEUE_WORKERS", default_value = "2")]
    queue_workers: usize,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9090")]
    metrics_addr: String,

    /// Exit after generating reports instead of serving metrics
    #[arg(long, env = "ONCE")]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    info!("Starting Gradebook v{}", gradebook_core::version());
    info!("  Audit log: {}", args.audit_log.display());
    info!("  Report dir: {}", args.report_dir.display());
    info!("  Cache capacity: {}", args.cache_capacity);
    info!("  Stats interval: {}s", args.stats_interval_seconds);

    // Store and demo data
    let store = Arc::new(EntityStore::new());
    let ids = SequenceGenerator::new("STU");
    gradebook_core::demo::load_sample_data(&store, &ids);

    let cache: Arc<LruCache<String, Arc<Record>>> = Arc::new(
        LruCache::new(args.cache_capacity).context("invalid cache capacity")?,
    );

    let audit = AuditLogger::start(AuditConfig::new(&args.audit_log));
    let scheduler =
        Arc::new(PeriodicScheduler::new(SchedulerConfig::default()).with_audit(Arc::clone(&audit)));

    // Stats aggregation
    let aggregator = StatsAggregator::new(
        Arc::clone(&store),
        cache.clone(),
        Some(Arc::clone(&audit)),
    );
    aggregator
        .start(
            Arc::clone(&scheduler),
            Duration::from_secs(args.stats_interval_seconds.max(1)),
        )
        .context("failed to start stats aggregator")?;

    // Warm the cache, best records first
    let queue = PriorityTaskQueue::new(TaskQueueConfig {
        workers: args.queue_workers,
    })
    .context("failed to start task queue")?;
    for record in store.snapshot_all() {
        let cache = Arc::clone(&cache);
        let priority = record.ranking_key().clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        queue.submit(priority, async move {
            if cache.get(&record.id).is_none() {
                cache.put(record.id.clone(), Arc::clone(&record));
            }
            Ok(())
        })?;
    }

    let demo_domain = RecordSearch::new(&store)
        .find_by_email_domain("demo.edu")
        .context("email domain search failed")?;
    info!(matches = demo_domain.len(), "Records on demo.edu");

    // Reports
    let mut report_ids: Vec<String> = store.snapshot_all().iter().map(|r| r.id.clone()).collect();
    report_ids.sort();
    let progress: Arc<dyn ProgressListener> = Arc::new(ConsoleProgress::new());
    let result = ReportGenerator::new(Arc::clone(&store))
        .generate_reports(
            &report_ids,
            args.report_concurrency,
            &args.report_dir,
            Some(Arc::clone(&audit)),
            Some(progress),
        )
        .await
        .context("report generation failed")?;
    info!(
        requested = result.requested,
        completed = result.completed,
        total_ms = result.total_duration_ms,
        "Reports generated"
    );

    aggregator.compute()?;
    let dashboard = Dashboard::new(Arc::clone(&aggregator), Arc::clone(&store));
    println!("{}", dashboard.render());

    // Metrics server
    let shutdown = CancellationToken::new();
    let server = if args.once {
        None
    } else {
        let listener = metrics::bind(&args.metrics_addr).await?;
        let context = MetricsContext {
            exporter: Arc::new(StatsExporter::new()?),
            aggregator: Arc::clone(&aggregator),
            cache: cache.clone(),
            audit: Some(Arc::clone(&audit)),
        };
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics::serve(listener, context, token).await {
                error!("Metrics server error: {}", e);
            }
        }))
    };

    if server.is_some() {
        info!("Serving metrics on {} (Ctrl-C to stop)", args.metrics_addr);
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("Shutdown requested");
    }

    // Shutdown
    shutdown.cancel();
    if let Some(server) = server {
        if let Err(e) = server.await {
            error!("Metrics server task failed: {}", e);
        }
    }
    aggregator.stop();
    scheduler.shutdown().await;
    queue.shutdown().await;
    audit.shutdown().await;

    info!(
        cache_hits = cache.hits(),
        cache_misses = cache.misses(),
        audit_written = audit.written(),
        "Gradebook shutdown complete"
    );
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
