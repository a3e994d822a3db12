//! Metrics exposition
//!
//! Prometheus gauges mirroring the stats snapshot, cache counters and audit
//! writer, served over HTTP alongside a health endpoint.
//!
//! ```text
//! GET /metrics ──▶ MetricsContext::render() ──▶ StatsExporter::update() ──▶ TextEncoder
//! GET /healthz ──▶ "ok"
//! ```

mod exporter;
mod server;

pub use exporter::{MetricsContext, StatsExporter};
pub use server::{bind, serve};
