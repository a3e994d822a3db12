//! Priority Task Queue
//!
//! A fixed pool of workers continuously pulls the highest-priority task from
//! one shared heap. Equal priorities are served in submission order.
//!
//! Task errors and panics are caught, logged and counted; a failing task
//! never takes its worker down.

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Task queue configuration
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// Number of worker tasks pulling from the queue
    pub workers: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

// =============================================================================
// Queue Entries
// =============================================================================

struct QueuedTask {
    priority: i32,
    seq: u64,
    task: BoxFuture<'static, Result<()>>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Max-heap: higher priority first, then lower sequence number first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    notify: Notify,
    closed: AtomicBool,
    next_seq: AtomicU64,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

// =============================================================================
// Priority Task Queue
// =============================================================================

/// Priority-ordered task queue backed by a fixed worker pool
pub struct PriorityTaskQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PriorityTaskQueue {
    /// Start `config.workers` workers. Must be called from within a Tokio
    /// runtime
    pub fn new(config: TaskQueueConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::InvalidConfig(
                "task queue needs at least one worker".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let workers = (0..config.workers)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&shared))))
            .collect();

        info!(workers = config.workers, "Task queue started");

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Queue `task` with `priority` (higher runs first)
    pub fn submit<F>(&self, priority: i32, task: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let seq = {
            // Checked under the heap lock so nothing lands after the workers
            // have seen the queue closed and empty
            let mut heap = self.shared.heap.lock();
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(Error::QueueClosed);
            }
            let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
            heap.push(QueuedTask {
                priority,
                seq,
                task: task.boxed(),
            });
            seq
        };
        self.shared.notify.notify_one();

        debug!(priority, seq, "Task submitted");
        Ok(())
    }

    /// Tasks currently executing
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a worker
    pub fn pending(&self) -> usize {
        self.shared.heap.lock().len()
    }

    /// Tasks that finished with `Ok`
    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Tasks that returned an error or panicked
    pub fn failed_count(&self) -> u64 {
        self.shared.failed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting submissions, run everything already queued, then
    /// wait for the workers to exit
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.close();

        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Task queue worker terminated abnormally");
            }
        }

        info!(
            completed = self.completed_count(),
            failed = self.failed_count(),
            "Task queue shut down"
        );
    }
}

impl fmt::Debug for PriorityTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityTaskQueue")
            .field("workers", &self.workers.lock().len())
            .field("pending", &self.pending())
            .field("active", &self.active_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PriorityTaskQueue {
    fn close(&self) {
        {
            let _heap = self.shared.heap.lock();
            self.shared.closed.store(true, Ordering::SeqCst);
        }
        self.shared.notify.notify_waiters();
    }
}

impl Drop for PriorityTaskQueue {
    fn drop(&mut self) {
        self.close();
    }
}

async fn worker_loop(id: usize, shared: Arc<Shared>) {
    loop {
        // Register interest before checking the heap so a submit or shutdown
        // between the check and the await is not missed
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let (next, closed) = {
            let mut heap = shared.heap.lock();
            (heap.pop(), shared.closed.load(Ordering::SeqCst))
        };
        match next {
            Some(entry) => run_task(id, &shared, entry).await,
            None if closed => break,
            None => notified.await,
        }
    }

    debug!(worker = id, "Task queue worker exiting");
}

async fn run_task(worker: usize, shared: &Shared, entry: QueuedTask) {
    shared.active.fetch_add(1, Ordering::SeqCst);
    let outcome = AssertUnwindSafe(entry.task).catch_unwind().await;
    shared.active.fetch_sub(1, Ordering::SeqCst);

    match outcome {
        Ok(Ok(())) => {
            shared.completed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Err(e)) => {
            shared.failed.fetch_add(1, Ordering::SeqCst);
            warn!(worker, priority = entry.priority, error = %e, "Queued task failed");
        }
        Err(panic) => {
            shared.failed.fetch_add(1, Ordering::SeqCst);
            error!(
                worker,
                priority = entry.priority,
                panic = panic_message(&*panic),
                "Queued task panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_entry_ordering() {
        let entry = |priority, seq| QueuedTask {
            priority,
            seq,
            task: async { Ok::<(), Error>(()) }.boxed(),
        };
        let mut heap = BinaryHeap::new();
        heap.push(entry(1, 0));
        heap.push(entry(5, 1));
        heap.push(entry(5, 2));
        heap.push(entry(-3, 3));

        let order: Vec<(i32, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.priority, e.seq))
            .collect();
        assert_eq!(order, vec![(5, 1), (5, 2), (1, 0), (-3, 3)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_workers_rejected() {
        let result = PriorityTaskQueue::new(TaskQueueConfig { workers: 0 });
        assert_matches!(result, Err(Error::InvalidConfig(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_higher_priority_served_first() {
        let queue = PriorityTaskQueue::new(TaskQueueConfig { workers: 1 }).unwrap();
        let gate = Arc::new(Notify::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        // Occupy the only worker so the rest queue up
        let blocker = Arc::clone(&gate);
        queue
            .submit(0, async move {
                blocker.notified().await;
                Ok(())
            })
            .unwrap();
        wait_until(|| queue.active_count() == 1).await;

        for (priority, label) in [(1, "low"), (5, "high-a"), (3, "mid"), (5, "high-b")] {
            let order = Arc::clone(&order);
            queue
                .submit(priority, async move {
                    order.lock().push(label);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(queue.pending(), 4);

        gate.notify_one();
        queue.shutdown().await;

        assert_eq!(*order.lock(), vec!["high-a", "high-b", "mid", "low"]);
        assert_eq!(queue.completed_count(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_active_count_bounded_by_workers() {
        let queue = PriorityTaskQueue::new(TaskQueueConfig { workers: 2 }).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
            queue
                .submit(0, async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        wait_until(|| queue.active_count() > 0).await;
        assert!(queue.active_count() <= 2);
        queue.shutdown().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.completed_count(), 6);
        assert_eq!(queue.active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_errors_and_panics_are_counted() {
        let queue = PriorityTaskQueue::new(TaskQueueConfig { workers: 2 }).unwrap();

        queue
            .submit(1, async { Err(Error::Internal("bad task".to_string())) })
            .unwrap();
        queue
            .submit(1, async {
                let explode = true;
                if explode {
                    panic!("task blew up");
                }
                Ok(())
            })
            .unwrap();
        queue.submit(1, async { Ok(()) }).unwrap();

        queue.shutdown().await;

        assert_eq!(queue.failed_count(), 2);
        assert_eq!(queue.completed_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_drains_and_rejects() {
        let queue = PriorityTaskQueue::new(TaskQueueConfig { workers: 1 }).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for i in 0..10 {
            let ran = Arc::clone(&ran);
            queue
                .submit(i, async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        queue.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert_eq!(queue.pending(), 0);
        assert!(queue.is_closed());

        assert_matches!(queue.submit(0, async { Ok(()) }), Err(Error::QueueClosed));
    }
}
