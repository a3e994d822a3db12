//! Gradebook Core - Concurrent infrastructure for grade tracking
//!
//! The concurrent layer of a student record application: an in-memory record
//! store with a live ranking index, a bounded LRU cache, an asynchronous
//! audit log writer, a fixed-rate scheduler, a background stats aggregator,
//! a bounded-parallelism report generator and a priority task queue.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!  records ──────▶│ EntityStore  │◀──────────────┐
//!                 └──────┬───────┘               │
//!                        │                       │
//!   ┌────────────────────▼──┐           ┌────────┴────────┐
//!   │   StatsAggregator     │           │ ReportGenerator │
//!   │ (PeriodicScheduler)   │           │ (Semaphore +    │
//!   └───┬───────────────┬───┘           │  JoinSet)       │
//!       │               │               └────────┬────────┘
//!       ▼               ▼                        │
//!   LruCache      Dashboard / /metrics           │
//!                                                ▼
//!                      AuditLogger ◀──── audit entries
//! ```
//!
//! `PeriodicScheduler` and `PriorityTaskQueue` are standalone primitives.
//!
//! # Modules
//!
//! - [`store`] - Entity store, ranking index, records and search
//! - [`cache`] - Bounded LRU cache with counters
//! - [`audit`] - Batched, rotating audit log writer
//! - [`scheduler`] - Named fixed-rate periodic tasks
//! - [`stats`] - Stats aggregator and text dashboard
//! - [`report`] - Batch report generation
//! - [`queue`] - Priority task queue on a worker pool
//! - [`metrics`] - Prometheus exposition and health endpoint
//! - [`demo`] - Sample data
//! - [`error`] - Error types

pub mod audit;
pub mod cache;
pub mod demo;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use audit::{AuditConfig, AuditLogger};
pub use cache::{CacheStats, CacheStatsSource, LruCache};
pub use error::{Error, Result};
pub use queue::{PriorityTaskQueue, TaskQueueConfig};
pub use report::{ReportGenerator, ReportResult};
pub use scheduler::{PeriodicScheduler, SchedulerConfig};
pub use stats::{StatsAggregator, StatsSnapshot};
pub use store::{EntityStore, Record, ScoreEntry, SequenceGenerator};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
