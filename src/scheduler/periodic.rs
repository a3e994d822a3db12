//! Periodic Scheduler
//!
//! Named fixed-rate tasks on the shared Tokio worker pool.
//!
//! # Semantics
//!
//! - Invocation `k` is due at `start + initial_delay + k * period`,
//!   independent of how long earlier invocations took
//! - Invocations of the same task never overlap. When a run overruns its
//!   period the missed ticks fire back-to-back once it finishes
//! - Each invocation runs in its own spawned task, so an error or a panic is
//!   reported and the schedule keeps going
//! - `cancel` stops future invocations only; a run already in progress
//!   completes

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::AuditLogger;
use crate::error::{Error, Result};

/// Default graceful shutdown timeout
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Audit operation kind for scheduler failures
const AUDIT_OPERATION: &str = "Scheduler";

type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

// =============================================================================
// Configuration
// =============================================================================

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long `shutdown` waits for running schedules before aborting them
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

// =============================================================================
// Scheduled Task
// =============================================================================

/// Handle to one registered schedule
struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
    runs: Arc<AtomicU64>,
}

// =============================================================================
// Periodic Scheduler
// =============================================================================

/// Fixed-rate scheduler keyed by task name
pub struct PeriodicScheduler {
    config: SchedulerConfig,
    tasks: DashMap<String, ScheduledTask>,
    shutdown: CancellationToken,
    audit: Option<Arc<AuditLogger>>,
}

impl PeriodicScheduler {
    /// Create a scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
            audit: None,
        }
    }

    /// Record failed invocations in `logger`
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Register `task` under `name`, first due after `initial_delay` and then
    /// every `period`.
    ///
    /// Registering an existing name cancels the previous schedule. Must be
    /// called from within a Tokio runtime.
    pub fn schedule_at_fixed_rate<F, Fut>(
        &self,
        name: &str,
        task: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(Error::SchedulerShutdown);
        }
        if period.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "period for task '{}' must be > 0",
                name
            )));
        }

        let task: TaskFn = Arc::new(move || task().boxed());
        let token = self.shutdown.child_token();
        let runs = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run_fixed_rate(
            name.to_string(),
            task,
            initial_delay,
            period,
            token.clone(),
            Arc::clone(&runs),
            self.audit.clone(),
        ));

        info!(
            task = name,
            ?initial_delay,
            ?period,
            "Scheduled fixed-rate task"
        );

        let scheduled = ScheduledTask {
            token,
            handle,
            runs,
        };
        if let Some(previous) = self.tasks.insert(name.to_string(), scheduled) {
            debug!(task = name, "Replacing existing schedule");
            previous.token.cancel();
        }

        Ok(())
    }

    /// Prevent future invocations of `name`. Returns false if unknown
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some((_, task)) => {
                task.token.cancel();
                info!(task = name, "Cancelled scheduled task");
                true
            }
            None => false,
        }
    }

    /// Check if `name` is currently scheduled
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Completed invocations of `name` (successful or not)
    pub fn run_count(&self, name: &str) -> Option<u64> {
        self.tasks
            .get(name)
            .map(|t| t.runs.load(Ordering::Relaxed))
    }

    /// Names of all scheduled tasks
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Check if the scheduler has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every schedule and wait up to the shutdown timeout for them to
    /// stop; anything still running afterwards is aborted
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let names: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            if let Some((_, task)) = self.tasks.remove(&name) {
                handles.push(task.handle);
            }
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let count = handles.len();

        match timeout(
            self.config.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await
        {
            Ok(_) => info!(tasks = count, "Scheduler shut down"),
            Err(_) => {
                warn!(
                    tasks = count,
                    timeout = ?self.config.shutdown_timeout,
                    "Scheduler shutdown timed out, aborting remaining tasks"
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

impl Default for PeriodicScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_fixed_rate(
    name: String,
    task: TaskFn,
    initial_delay: Duration,
    period: Duration,
    token: CancellationToken,
    runs: Arc<AtomicU64>,
    audit: Option<Arc<AuditLogger>>,
) {
    let mut tick = interval_at(Instant::now() + initial_delay, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
        }

        let started = std::time::Instant::now();
        // The closure itself runs on the child so a panic while building the
        // future is caught like one raised inside it
        let invocation = Arc::clone(&task);
        let outcome = tokio::spawn(async move { invocation().await }).await;
        runs.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let failure = match outcome {
            Ok(Ok(())) => {
                debug!(task = %name, elapsed_ms, "Scheduled task completed");
                None
            }
            Ok(Err(e)) => {
                warn!(task = %name, error = %e, "Scheduled task failed");
                Some(e.to_string())
            }
            Err(e) => {
                error!(task = %name, error = %e, "Scheduled task panicked");
                Some(format!("panicked: {}", e))
            }
        };

        if let (Some(reason), Some(audit)) = (failure, &audit) {
            let failure = Error::TaskFailed {
                name: name.clone(),
                reason,
            };
            audit.log(AUDIT_OPERATION, &failure.to_string(), elapsed_ms, false);
        }
    }

    debug!(task = %name, "Fixed-rate loop stopped");
}

// =============================================================================
// Tests
// =============================================================================
