//! Face detector seam.
//!
//! The pipeline only needs per-frame boxes; any model can sit behind
//! [`FaceDetector`]. The YuNet adapter is compiled with the `opencv` feature.

mod yunet;

pub use yunet::{find_model_path, YuNetDetector, YuNetFactory};

use image::RgbImage;
use redact_models::BoundingBox;

use crate::error::MediaResult;

/// Per-frame face detector.
///
/// Called once per frame at full input resolution. An empty result is valid.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        (**self).detect(frame)
    }
}

/// Creates a detector sized for a job's frames.
pub trait DetectorFactory: Send + Sync {
    fn create(&self, frame_width: u32, frame_height: u32) -> MediaResult<Box<dyn FaceDetector>>;
}
