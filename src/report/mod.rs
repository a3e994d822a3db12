//! Batch Reports
//!
//! ```text
//! ids ──▶ JoinSet ──Semaphore(max(1, concurrency))──▶ job: get ─▶ write <id>.report.txt
//!                                                          │
//!                                   audit entry ◀──────────┤
//!                                   completed += 1 ─▶ ProgressListener
//! ```

mod format;
mod generator;
mod progress;

pub use format::{render_report, report_path, REPORT_SUFFIX};
pub use generator::{ReportGenerator, ReportResult};
pub use progress::{ConsoleProgress, ProgressListener};
