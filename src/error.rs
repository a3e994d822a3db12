//! Error types for the grade tracking core

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the grade tracking core
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (e.g. a cache capacity of zero)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking wait was interrupted before all work finished
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Task queue no longer accepts submissions
    #[error("Task queue is shut down")]
    QueueClosed,

    /// Scheduler no longer accepts registrations
    #[error("Scheduler is shut down")]
    SchedulerShutdown,

    /// A scheduled or queued task failed
    #[error("Task '{name}' failed: {reason}")]
    TaskFailed { name: String, reason: String },

    /// Invalid search pattern
    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error represents cancellation of a blocking wait
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

// =============================================================================
// Tests
// =============================================================================
