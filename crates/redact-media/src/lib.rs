//! Face-region redaction media layer.
//!
//! This crate provides:
//! - Multi-face tracking with greedy IoU/center-distance association
//! - Soft-edged elliptical blur rendering
//! - A cancellable decode → detect → track → redact → encode pipeline
//! - FFmpeg command building, probing and raw frame pipes
//! - Voice anonymization for video audio tracks

pub mod command;
pub mod detection;
pub mod error;
pub mod ffmpeg_io;
pub mod fs_utils;
pub mod metrics;
pub mod pipeline;
pub mod probe;
pub mod redaction;
pub mod tracking;
pub mod voice;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use detection::{DetectorFactory, FaceDetector, YuNetFactory};
pub use error::{MediaError, MediaResult};
pub use pipeline::{
    redact_image_file, EdgeCrop, FfmpegTranscoder, FrameSink, FrameSource, PipelineConfig,
    Transcoder, VideoRedactionPipeline,
};
pub use probe::{probe_video, VideoInfo};
pub use redaction::RegionRenderer;
pub use tracking::{TrackAssociationEngine, TrackerConfig};
pub use voice::{anonymize_voice, VoiceParams};
