//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Cannot read source frames: {0}")]
    SourceUnreadable(String),

    #[error("Cannot write output frames: {0}")]
    SinkUnwritable(String),

    #[error("Face detection failed: {0}")]
    DetectionFailed(String),

    #[error("Visual tracker failed: {0}")]
    TrackerFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a tracker failure error.
    pub fn tracker_failed(message: impl Into<String>) -> Self {
        Self::TrackerFailed(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn source_unreadable(message: impl Into<String>) -> Self {
        Self::SourceUnreadable(message.into())
    }

    pub fn sink_unwritable(message: impl Into<String>) -> Self {
        Self::SinkUnwritable(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error means the job's input or output can no longer be
    /// used, as opposed to a fault confined to a single frame.
    pub fn is_fatal_io(&self) -> bool {
        matches!(
            self,
            MediaError::Io(_)
                | MediaError::FileNotFound(_)
                | MediaError::SourceUnreadable(_)
                | MediaError::SinkUnwritable(_)
                | MediaError::FfmpegNotFound
                | MediaError::FfprobeNotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_io_classification() {
        assert!(MediaError::source_unreadable("eof mid-frame").is_fatal_io());
        assert!(MediaError::sink_unwritable("broken pipe").is_fatal_io());
        assert!(MediaError::Io(std::io::Error::other("disk")).is_fatal_io());
        assert!(!MediaError::detection_failed("bad tensor").is_fatal_io());
        assert!(!MediaError::tracker_failed("lost").is_fatal_io());
        assert!(!MediaError::Cancelled.is_fatal_io());
    }
}
