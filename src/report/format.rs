//! Report artifact format
//!
//! One plain-text file per record, parsed by external tooling:
//!
//! ```text
//! Report for <name> (<id>)
//! GPA: <metric>
//! Grades:
//!  - <code> (<name>): <score to 2 decimals>
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::store::Record;

/// Suffix appended to the record id to form the artifact file name
pub const REPORT_SUFFIX: &str = ".report.txt";

/// Artifact path for `id` under `out_dir`
pub fn report_path(out_dir: &Path, id: &str) -> PathBuf {
    out_dir.join(format!("{}{}", id, REPORT_SUFFIX))
}

/// Render the report body for `record`.
///
/// The metric is printed in shortest round-trip form (`85.0`,
/// `86.66666666666667`), scores with exactly two decimals.
pub fn render_report(record: &Record) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "Report for {} ({})", record.name, record.id);
    let _ = writeln!(out, "GPA: {:?}", record.metric());
    let _ = writeln!(out, "Grades:");
    for grade in &record.grades {
        let _ = writeln!(out, " - {} ({}): {:.2}", grade.code, grade.name, grade.score);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
