//! Batch Report Generator
//!
//! Writes one report artifact per requested id with bounded parallelism.
//!
//! `completed` counts every job that reached its finalization step, failed
//! writes and unknown ids included. It measures accounted-for jobs, not
//! successful ones.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::format::{render_report, report_path};
use super::progress::ProgressListener;
use crate::audit::AuditLogger;
use crate::error::{Error, Result};
use crate::store::EntityStore;

const AUDIT_OPERATION: &str = "ReportGen";

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportResult {
    /// Number of ids requested
    pub requested: usize,
    /// Jobs that reached finalization, successful or not
    pub completed: usize,
    /// Wall-clock duration of the whole batch
    pub total_duration_ms: u64,
    /// Duration per id for jobs that found their record
    pub per_item_duration_ms: HashMap<String, u64>,
}

/// State shared by the jobs of one batch
struct BatchContext {
    store: Arc<EntityStore>,
    out_dir: PathBuf,
    total: usize,
    completed: AtomicUsize,
    timings: DashMap<String, u64>,
    audit: Option<Arc<AuditLogger>>,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl BatchContext {
    async fn run_job(&self, id: &str) {
        self.write_report(id).await;

        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.progress {
            progress.on_progress(done, self.total, id);
        }
    }

    async fn write_report(&self, id: &str) {
        let started = Instant::now();

        let Some(record) = self.store.get(id) else {
            debug!(id, "Record not found, skipping report");
            return;
        };

        let path = report_path(&self.out_dir, id);
        let outcome = tokio::fs::write(&path, render_report(&record)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.timings.insert(id.to_string(), elapsed_ms);

        match outcome {
            Ok(()) => {
                debug!(id, elapsed_ms, "Generated report");
                if let Some(audit) = &self.audit {
                    audit.log(
                        AUDIT_OPERATION,
                        &format!("Generated report for {}", id),
                        elapsed_ms,
                        true,
                    );
                }
            }
            Err(e) => {
                warn!(id, path = %path.display(), error = %e, "Failed to write report");
                if let Some(audit) = &self.audit {
                    audit.log(
                        AUDIT_OPERATION,
                        &format!("Failed for {} -> {}", id, e),
                        elapsed_ms,
                        false,
                    );
                }
            }
        }
    }
}

/// Generates per-record reports concurrently
pub struct ReportGenerator {
    store: Arc<EntityStore>,
}

impl ReportGenerator {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Generate reports for `ids` into `out_dir` with at most
    /// `max(1, concurrency)` jobs in flight, waiting for all of them
    pub async fn generate_reports(
        &self,
        ids: &[String],
        concurrency: usize,
        out_dir: &Path,
        audit: Option<Arc<AuditLogger>>,
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> Result<ReportResult> {
        self.generate_reports_with_cancel(
            ids,
            concurrency,
            out_dir,
            audit,
            progress,
            CancellationToken::new(),
        )
        .await
    }

    /// Like [`generate_reports`](Self::generate_reports), but gives up
    /// waiting when `cancel` fires.
    ///
    /// Outstanding jobs are aborted and [`Error::Cancelled`] is returned.
    /// Artifacts already written stay on disk.
    #[instrument(skip_all, fields(requested = ids.len(), concurrency = concurrency))]
    pub async fn generate_reports_with_cancel(
        &self,
        ids: &[String],
        concurrency: usize,
        out_dir: &Path,
        audit: Option<Arc<AuditLogger>>,
        progress: Option<Arc<dyn ProgressListener>>,
        cancel: CancellationToken,
    ) -> Result<ReportResult> {
        tokio::fs::create_dir_all(out_dir).await?;

        if ids.is_empty() {
            return Ok(ReportResult::default());
        }

        let workers = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let context = Arc::new(BatchContext {
            store: Arc::clone(&self.store),
            out_dir: out_dir.to_path_buf(),
            total: ids.len(),
            completed: AtomicUsize::new(0),
            timings: DashMap::new(),
            audit,
            progress,
        });

        let started = Instant::now();
        let mut jobs = JoinSet::new();
        for id in ids {
            let semaphore = Arc::clone(&semaphore);
            let context = Arc::clone(&context);
            let id = id.clone();
            jobs.spawn(async move {
                // The semaphore is never closed
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                context.run_job(&id).await;
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    jobs.abort_all();
                    let completed = context.completed.load(Ordering::SeqCst);
                    warn!(completed, total = ids.len(), "Report generation cancelled");
                    return Err(Error::Cancelled(format!(
                        "report generation interrupted after {} of {} jobs",
                        completed,
                        ids.len()
                    )));
                }
                next = jobs.join_next() => match next {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(error = %e, "Report job panicked"),
                    None => break,
                },
            }
        }

        let result = ReportResult {
            requested: ids.len(),
            completed: context.completed.load(Ordering::SeqCst),
            total_duration_ms: started.elapsed().as_millis() as u64,
            per_item_duration_ms: context
                .timings
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        };

        info!(
            requested = result.requested,
            completed = result.completed,
            total_ms = result.total_duration_ms,
            workers,
            "Report generation finished"
        );

        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================
