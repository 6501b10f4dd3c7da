//! Decode, detect, track, redact and encode.
//!
//! The frame loop is written against [`FrameSource`], [`FrameSink`] and
//! [`FaceDetector`](crate::detection::FaceDetector) so it can be driven by
//! FFmpeg pipes in production and by in-memory fakes in tests.

mod image_job;
mod transcode;
mod video;

pub use image_job::{redact_image_file, redact_image_frame};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use video::{FrameLoopEnd, FrameStats, VideoIo, VideoRedactionPipeline};

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};
use crate::tracking::TrackerConfig;

/// Sequential producer of decoded frames.
pub trait FrameSource: Send {
    /// Width and height of every frame this source yields.
    fn frame_size(&self) -> (u32, u32);

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// Sequential consumer of output frames.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and close the output.
    fn finish(&mut self) -> MediaResult<()>;

    /// Stop without finalizing; the output is left for the caller to delete.
    fn abort(&mut self);
}

/// Settings for one redaction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    /// Percent of width and height trimmed from each edge of video output
    pub edge_crop_percent: u32,
    /// Timeout for external FFmpeg steps, in seconds
    pub transcode_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            edge_crop_percent: 2,
            transcode_timeout_secs: 300,
        }
    }
}

/// Border trimmed from every output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeCrop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl EdgeCrop {
    /// Crop `percent` of each dimension from both sides of a
    /// `width x height` frame. Fails if nothing would remain.
    pub fn new(width: u32, height: u32, percent: u32) -> MediaResult<Self> {
        let x = (width as u64 * percent as u64 / 100) as u32;
        let y = (height as u64 * percent as u64 / 100) as u32;
        let cropped_w = width.saturating_sub(2 * x);
        let cropped_h = height.saturating_sub(2 * y);

        if cropped_w == 0 || cropped_h == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{percent}% edge crop leaves no pixels of {width}x{height}"
            )));
        }

        Ok(Self {
            x,
            y,
            width: cropped_w,
            height: cropped_h,
        })
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_identity(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn apply(&self, frame: RgbImage) -> RgbImage {
        if self.is_identity() {
            return frame;
        }
        imageops::crop_imm(&frame, self.x, self.y, self.width, self.height).to_image()
    }
}
