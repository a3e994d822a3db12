//! Statistics
//!
//! Background aggregation over the entity store and cache, plus a plain-text
//! dashboard over the published snapshot.
//!
//! ```text
//! PeriodicScheduler ──every interval──▶ StatsAggregator::compute()
//!                                         │  reads EntityStore + CacheStatsSource
//!                                         ▼
//!                              per-field atomic snapshot ──▶ Dashboard / StatsExporter
//! ```

mod aggregator;
mod dashboard;

pub use aggregator::{StatsAggregator, StatsSnapshot, STATS_TASK_NAME};
pub use dashboard::{Dashboard, DashboardStatus, GradeDistribution, TOP_RECORDS};
