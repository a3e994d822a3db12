//! Plain-text statistics dashboard

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::SecondsFormat;

use super::aggregator::StatsAggregator;
use crate::store::{EntityStore, Record};

/// Number of records listed under top performers
pub const TOP_RECORDS: usize = 5;

const RULE: &str = "+------------------------------------------------------+";

/// Aggregator state as shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardStatus {
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for DashboardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Record counts per letter band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeDistribution {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
    pub f: usize,
}

impl GradeDistribution {
    /// Bucket records by metric: A >= 90, B >= 80, C >= 70, D >= 60, else F
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Arc<Record>>) -> Self {
        let mut dist = Self::default();
        for record in records {
            let metric = record.metric();
            match metric {
                m if m >= 90.0 => dist.a += 1,
                m if m >= 80.0 => dist.b += 1,
                m if m >= 70.0 => dist.c += 1,
                m if m >= 60.0 => dist.d += 1,
                _ => dist.f += 1,
            }
        }
        dist
    }
}

impl fmt::Display for GradeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}/{}", self.a, self.b, self.c, self.d, self.f)
    }
}

/// Non-interactive view over the aggregator and store
pub struct Dashboard {
    aggregator: Arc<StatsAggregator>,
    store: Arc<EntityStore>,
}

impl Dashboard {
    pub fn new(aggregator: Arc<StatsAggregator>, store: Arc<EntityStore>) -> Self {
        Self { aggregator, store }
    }

    /// Paused takes precedence over stopped
    pub fn status(&self) -> DashboardStatus {
        if self.aggregator.is_paused() {
            DashboardStatus::Paused
        } else if self.aggregator.is_running() {
            DashboardStatus::Running
        } else {
            DashboardStatus::Stopped
        }
    }

    /// Highest-ranked records, best first
    pub fn top_records(&self, n: usize) -> Vec<Arc<Record>> {
        self.store
            .ranking_snapshot()
            .into_iter()
            .flat_map(|bucket| bucket.records)
            .take(n)
            .collect()
    }

    /// Render the dashboard as text
    pub fn render(&self) -> String {
        let snapshot = self.aggregator.snapshot();
        let records = self.store.snapshot_all();
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "| {:<52} |", "Real-Time Statistics Dashboard");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "Status: {}", self.status());
        let _ = writeln!(
            out,
            "Last update: {}",
            snapshot
                .last_update
                .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .unwrap_or_else(|| "-".to_string())
        );
        let _ = writeln!(
            out,
            "Loading: {}",
            if self.aggregator.is_loading() { "Busy" } else { "Idle" }
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Average GPA:  {:.2}    Students:  {}",
            snapshot.average_metric, snapshot.total_records
        );
        let _ = writeln!(
            out,
            "Cache: hits={} misses={}",
            snapshot.cache_hits, snapshot.cache_misses
        );
        let _ = writeln!(
            out,
            "Grade distribution (A/B/C/D/F): {}",
            GradeDistribution::from_records(&records)
        );
        for record in self.top_records(TOP_RECORDS) {
            let _ = writeln!(out, "{} - GPA: {:.2}", record.id, record.metric());
        }
        let _ = writeln!(out, "{}", RULE);

        out
    }
}

// =============================================================================
// Tests
// =============================================================================
