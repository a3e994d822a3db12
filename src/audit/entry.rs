//! Audit Log Entries

use chrono::{DateTime, SecondsFormat, Utc};

/// One audit log line, captured at the time of the logging call
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// Identifier of the originating thread
    pub origin: String,
    /// Operation kind (e.g. "ReportGen", "StatsCalc")
    pub operation: String,
    /// Free-text message with newlines normalized to spaces
    pub message: String,
    /// Duration of the logged operation
    pub duration_ms: u64,
    /// Whether the operation succeeded
    pub success: bool,
}

impl LogEntry {
    /// Capture an entry for the calling thread
    pub fn new(operation: &str, message: &str, duration_ms: u64, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            origin: current_origin(),
            operation: operation.to_string(),
            message: message.replace(['\r', '\n'], " "),
            duration_ms,
            success,
        }
    }

    /// Render the entry as a single log file line (without trailing newline)
    ///
    /// `<timestamp> | TID:<origin> | <operation> | <message> | <duration>ms | SUCCESS|FAIL`
    pub fn to_line(&self) -> String {
        format!(
            "{} | TID:{} | {} | {} | {}ms | {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.origin,
            self.operation,
            self.message,
            self.duration_ms,
            if self.success { "SUCCESS" } else { "FAIL" }
        )
    }
}

/// Numeric id of the current thread
fn current_origin() -> String {
    let id = format!("{:?}", std::thread::current().id());
    id.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================
