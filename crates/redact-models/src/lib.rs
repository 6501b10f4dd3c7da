//! Shared data models for the redaction backend.
//!
//! This crate provides Serde-serializable types for:
//! - Pixel bounding boxes and IoU geometry
//! - Job kinds, submissions and queue payload descriptors
//! - Terminal job outcomes
//! - Scheduler status snapshots

pub mod job;
pub mod outcome;
pub mod rect;
pub mod status;

// Re-export common types
pub use job::{
    ChatId, FileDescriptor, JobId, JobKind, MediaType, MessageRef, ModeMetadata,
    ParseJobKindError, ProcessingMode, UserId, VoiceLevel,
};
pub use outcome::{JobOutcome, JobState};
pub use rect::BoundingBox;
pub use status::{ActiveJobSummary, QueuePosition, ServerStatus};
