//! Periodic Scheduling
//!
//! Runs named background tasks at a fixed rate until cancelled.
//!
//! ```text
//! schedule_at_fixed_rate(name) ──▶ loop task ──tick──▶ spawn(invocation) ──▶ await
//!                                     ▲                      │
//!                  cancel(name) ──────┘        Err / panic ──┴──▶ warn! + audit
//! ```

mod periodic;

pub use periodic::{PeriodicScheduler, SchedulerConfig, DEFAULT_SHUTDOWN_TIMEOUT};
