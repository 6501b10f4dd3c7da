//! Prometheus metrics for the coordinator.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const SUBMISSIONS_TOTAL: &str = "redact_submissions_total";
    pub const JOBS_FINISHED_TOTAL: &str = "redact_jobs_finished_total";
    pub const QUEUE_LENGTH: &str = "redact_queue_length";
    pub const ACTIVE_JOBS: &str = "redact_active_jobs";
    pub const EVICTIONS_TOTAL: &str = "redact_queue_evictions_total";
}

/// Serve `/metrics` on `0.0.0.0:port`. Must be called inside a Tokio runtime.
pub fn install_prometheus(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("Prometheus exporter: {e}")))
}

/// Record a submission by decision (`admitted`, `queued`, or a rejection label).
pub fn record_submission(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::SUBMISSIONS_TOTAL, &labels).increment(1);
}

pub fn record_job_finished(kind: &'static str, outcome: &'static str) {
    counter!(names::JOBS_FINISHED_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_eviction() {
    counter!(names::EVICTIONS_TOTAL).increment(1);
}

pub fn set_occupancy(active: usize, queued: usize) {
    gauge!(names::ACTIVE_JOBS).set(active as f64);
    gauge!(names::QUEUE_LENGTH).set(queued as f64);
}
