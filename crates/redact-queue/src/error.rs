//! Queue error types.

use redact_models::{JobId, UserId};
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Misuse of the scheduler state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("User {0} has no active job")]
    NotActive(UserId),

    #[error("Job {job_id} is not the active job of user {user_id}")]
    JobMismatch { user_id: UserId, job_id: JobId },

    #[error("User {0} is not queued")]
    NotQueued(UserId),
}

/// Why a submission was refused. Rejections are synchronous and never
/// create queue or job state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("File is {size_mb:.1} MB; the limit is {limit_mb:.0} MB")]
    FileTooLarge { size_mb: f64, limit_mb: f64 },

    #[error("Video is {duration_secs} s long; the limit is {limit_secs} s")]
    VideoTooLong { duration_secs: u32, limit_secs: u32 },

    #[error("Image is {width}x{height}; the limit is {limit}px per side")]
    ResolutionTooHigh { width: u32, height: u32, limit: u32 },

    #[error("Voice mode works only with videos")]
    VoiceNeedsVideo,

    #[error("Please wait {remaining_secs} s before submitting again")]
    OnCooldown { remaining_secs: u64 },

    #[error("A job is already processing; cancel it before sending another")]
    AlreadyProcessing,
}

impl Rejection {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::FileTooLarge { .. } => "file_too_large",
            Rejection::VideoTooLong { .. } => "video_too_long",
            Rejection::ResolutionTooHigh { .. } => "resolution_too_high",
            Rejection::VoiceNeedsVideo => "voice_needs_video",
            Rejection::OnCooldown { .. } => "on_cooldown",
            Rejection::AlreadyProcessing => "already_processing",
        }
    }
}
