//! Audit Logging
//!
//! Append-only operational audit trail, written asynchronously in batches.
//!
//! ```text
//! producers ──log()──▶ SegQueue ──(every flush_interval)──▶ rotate? ──▶ append
//!                                                             │
//!                                                    audit.log ─▶ audit.log.1
//! ```
//!
//! The audit file is a domain artifact, separate from the `tracing`
//! diagnostics the rest of the crate emits.

mod entry;
mod writer;

pub use entry::LogEntry;
pub use writer::{AuditConfig, AuditLogger, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BYTES};
