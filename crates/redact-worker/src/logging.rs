//! Structured job logging utilities.

use redact_models::{JobId, JobKind, UserId};
use tracing::{error, info, warn, Span};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    user_id: UserId,
    kind: JobKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, user_id: UserId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id,
            kind,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            kind = self.kind.as_str(),
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            kind = self.kind.as_str(),
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span covering the whole job, entered by the executor.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            user_id = %self.user_id,
            kind = self.kind.as_str()
        )
    }
}
