//! Report progress callbacks
//!
//! Listeners are invoked directly from report workers, so they are called
//! concurrently and must be `Send + Sync`.

use std::io::Write;

use parking_lot::Mutex;

/// Receives `(completed, total, id)` after each report job finishes
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize, id: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn on_progress(&self, completed: usize, total: usize, id: &str) {
        self(completed, total, id)
    }
}

/// Single-line progress printer for terminals.
///
/// Concurrent updates are serialized so the line is never interleaved.
#[derive(Default)]
pub struct ConsoleProgress {
    line: Mutex<()>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of the progress line for one update
    pub fn format_line(completed: usize, total: usize, id: &str) -> String {
        let percent = if total == 0 {
            100
        } else {
            completed * 100 / total
        };
        format!(
            "\rGenerating reports: {}/{} ({:>3}%) last={}",
            completed, total, percent, id
        )
    }
}

impl ProgressListener for ConsoleProgress {
    fn on_progress(&self, completed: usize, total: usize, id: &str) {
        let _line = self.line.lock();
        let mut stdout = std::io::stdout().lock();
        // Progress output is best-effort
        let _ = write!(stdout, "{}", Self::format_line(completed, total, id));
        if completed >= total {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    }
}

// =============================================================================
// Tests
// =============================================================================
