//! Async Audit Log Writer
//!
//! Non-blocking producers push entries onto a lock-free queue; a background
//! task drains the queue once per flush interval and appends the batch to
//! the log file, rotating it to a single `.1` sibling when it grows past the
//! size threshold.
//!
//! Delivery is best-effort: a batch that fails to write is dropped, and the
//! queue is unbounded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::SegQueue;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::entry::LogEntry;

/// Default flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default rotation threshold (10 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Audit writer configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Active log file
    pub path: PathBuf,
    /// Interval between flush cycles
    pub flush_interval: Duration,
    /// Rotate once the active file exceeds this many bytes
    pub max_bytes: u64,
}

impl AuditConfig {
    /// Configuration for `path` with the default interval and threshold
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Path of the rotated sibling (`<path>.1`)
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".1");
        PathBuf::from(name)
    }
}

/// State shared between producers and the flush task
struct Inner {
    config: AuditConfig,
    queue: SegQueue<LogEntry>,
    /// Serializes flush cycles so batches never interleave on disk
    flush_lock: tokio::sync::Mutex<()>,
    written: AtomicU64,
    lost: AtomicU64,
}

impl Inner {
    /// One flush cycle: drain, rotate if needed, append
    async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;

        let mut batch = Vec::new();
        while let Some(entry) = self.queue.pop() {
            batch.push(entry);
        }
        if batch.is_empty() {
            return;
        }

        if let Err(e) = self.rotate_if_needed().await {
            debug!(error = %e, "Audit log rotation failed");
        }

        let mut buf = String::new();
        for entry in &batch {
            buf.push_str(&entry.to_line());
            buf.push('\n');
        }

        match append(&self.config.path, buf.as_bytes()).await {
            Ok(()) => {
                self.written.fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.lost.fetch_add(batch.len() as u64, Ordering::Relaxed);
                warn!(
                    path = %self.config.path.display(),
                    entries = batch.len(),
                    error = %e,
                    "Audit batch write failed, batch dropped"
                );
            }
        }
    }

    async fn rotate_if_needed(&self) -> std::io::Result<()> {
        let size = match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if size > self.config.max_bytes {
            let rotated = self.config.rotated_path();
            match tokio::fs::remove_file(&rotated).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            tokio::fs::rename(&self.config.path, &rotated).await?;
            info!(
                path = %self.config.path.display(),
                size,
                "Rotated audit log"
            );
        }

        Ok(())
    }
}

async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// Asynchronous append-only audit logger
pub struct AuditLogger {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// Start the writer and its background flush task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: AuditConfig) -> Arc<Self> {
        let inner = Arc::new(Inner {
            config,
            queue: SegQueue::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            written: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        });
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run(Arc::clone(&inner), shutdown.clone()));

        Arc::new(Self {
            inner,
            shutdown,
            handle: parking_lot::Mutex::new(Some(handle)),
        })
    }

    /// Enqueue an entry. Never blocks; returning does not imply persistence
    pub fn log(&self, operation: &str, message: &str, duration_ms: u64, success: bool) {
        self.inner
            .queue
            .push(LogEntry::new(operation, message, duration_ms, success));
    }

    /// Run one flush cycle now
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Entries queued but not yet drained
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Entries successfully appended to the file
    pub fn written(&self) -> u64 {
        self.inner.written.load(Ordering::Relaxed)
    }

    /// Entries dropped because their batch failed to write
    pub fn lost(&self) -> u64 {
        self.inner.lost.load(Ordering::Relaxed)
    }

    /// Writer configuration
    pub fn config(&self) -> &AuditConfig {
        &self.inner.config
    }

    /// Stop the flush loop after exactly one final flush
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Audit writer task ended abnormally");
            }
        }
    }
}

impl Drop for AuditLogger {
    fn drop(&mut self) {
        // The flush task performs its final flush on its own
        self.shutdown.cancel();
    }
}

async fn run(inner: Arc<Inner>, shutdown: CancellationToken) {
    debug!(path = %inner.config.path.display(), "Audit writer started");

    let period = inner.config.flush_interval;
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => inner.flush().await,
        }
    }

    inner.flush().await;
    debug!(path = %inner.config.path.display(), "Audit writer stopped");
}

// =============================================================================
// Tests
// =============================================================================
