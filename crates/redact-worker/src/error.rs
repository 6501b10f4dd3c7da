//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Payload fetch failed: {0}")]
    FetchFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] redact_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] redact_queue::QueueError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Failure to reach a user through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The user can no longer be reached (blocked the bot, chat deleted)
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    /// Any other delivery problem; the user stays where they are
    #[error("Notification failed: {0}")]
    Failed(String),
}

impl NotifyError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, NotifyError::Unreachable(_))
    }
}
