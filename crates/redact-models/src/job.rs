//! Job and submission definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Transport-level user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level conversation identifier used for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the transport message that shows a user's queue status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MessageRef(pub i64);

/// Unique identifier for an admitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job does with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Blur faces in a still image
    Image,
    /// Track and blur faces across a video
    VideoFace,
    /// Anonymize the voice track of a video
    VideoVoice,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::VideoFace => "video_face",
            JobKind::VideoVoice => "video_voice",
        }
    }

    /// Whether the payload is a video container.
    pub fn is_video(&self) -> bool {
        matches!(self, JobKind::VideoFace | JobKind::VideoVoice)
    }

    /// Job for a payload under the user's processing mode.
    ///
    /// Returns `None` for voice mode on a still image.
    pub fn for_media(media: MediaType, mode: ProcessingMode) -> Option<Self> {
        match (media, mode) {
            (MediaType::Image, ProcessingMode::Face) => Some(JobKind::Image),
            (MediaType::Image, ProcessingMode::Voice) => None,
            (MediaType::Video, ProcessingMode::Face) => Some(JobKind::VideoFace),
            (MediaType::Video, ProcessingMode::Voice) => Some(JobKind::VideoVoice),
        }
    }
}

/// Container type of an uploaded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

/// What the user asked to anonymize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Blur faces
    #[default]
    Face,
    /// Disguise the voice track
    Voice,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown job kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job kind: {0}")]
pub struct ParseJobKindError(pub String);

impl FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "image" | "photo" => Ok(JobKind::Image),
            "video_face" | "video" | "face" => Ok(JobKind::VideoFace),
            "video_voice" | "voice" => Ok(JobKind::VideoVoice),
            other => Err(ParseJobKindError(other.to_string())),
        }
    }
}

/// Strength of voice anonymization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoiceLevel {
    /// Pitch/tempo shift only
    #[default]
    Fast,
    /// Stronger shift plus band-limiting
    Secure,
}

/// Per-user processing mode settings carried with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModeMetadata {
    /// Selected processing mode
    #[serde(default)]
    pub mode: ProcessingMode,
    /// Voice anonymization strength (video-voice jobs only)
    #[serde(default)]
    pub voice_level: VoiceLevel,
}

/// Description of the uploaded payload.
///
/// `content_ref` is opaque to the core; the transport resolves it to bytes
/// when the job actually starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileDescriptor {
    /// Opaque content reference (transport file id or local path)
    pub content_ref: String,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Original file name, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Media duration in seconds, when the transport reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    /// Pixel width, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl FileDescriptor {
    /// Create a descriptor with just a reference and a size.
    pub fn new(content_ref: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            content_ref: content_ref.into(),
            size_bytes,
            file_name: None,
            duration_secs: None,
            width: None,
            height: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Payload size in mebibytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// File extension of the original name, including the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name.as_deref()?;
        let idx = name.rfind('.')?;
        let ext = &name[idx..];
        (ext.len() > 1).then_some(ext)
    }
}
