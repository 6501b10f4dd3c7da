//! YuNet face detector via OpenCV's `FaceDetectorYN`.

use std::path::{Path, PathBuf};

#[cfg(feature = "opencv")]
use image::RgbImage;
#[cfg(feature = "opencv")]
use redact_models::BoundingBox;
#[cfg(feature = "opencv")]
use tracing::{debug, info, warn};

use super::{DetectorFactory, FaceDetector};
use crate::error::{MediaError, MediaResult};

/// Model locations searched when no explicit path is configured.
const YUNET_MODEL_PATHS: &[&str] = &[
    "/app/models/face_detection_yunet_2023mar.onnx",
    "./models/face_detection_yunet_2023mar.onnx",
    "/usr/share/opencv4/face_detection_yunet_2023mar.onnx",
];

#[cfg(feature = "opencv")]
const SCORE_THRESHOLD: f32 = 0.5;
#[cfg(feature = "opencv")]
const NMS_THRESHOLD: f32 = 0.3;
#[cfg(feature = "opencv")]
const TOP_K: i32 = 50;

/// First YuNet model found in the default locations.
pub fn find_model_path() -> Option<PathBuf> {
    YUNET_MODEL_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

/// Builds [`YuNetDetector`]s for a fixed model file.
#[derive(Debug, Clone)]
pub struct YuNetFactory {
    model_path: PathBuf,
}

impl YuNetFactory {
    pub fn new(model_path: impl Into<PathBuf>) -> MediaResult<Self> {
        let model_path = model_path.into();
        if !model_path.exists() {
            return Err(MediaError::model_not_found(model_path.display().to_string()));
        }
        Ok(Self { model_path })
    }

    /// Factory for the first model found in the default locations.
    pub fn discover() -> MediaResult<Self> {
        let path = find_model_path()
            .ok_or_else(|| MediaError::model_not_found("face_detection_yunet_2023mar.onnx"))?;
        Self::new(path)
    }
}

impl DetectorFactory for YuNetFactory {
    fn create(&self, frame_width: u32, frame_height: u32) -> MediaResult<Box<dyn FaceDetector>> {
        let detector = YuNetDetector::new(&self.model_path, frame_width, frame_height)?;
        Ok(Box::new(detector))
    }
}

/// YuNet face detector running at full frame resolution.
#[cfg(feature = "opencv")]
pub struct YuNetDetector {
    detector: opencv::core::Ptr<opencv::objdetect::FaceDetectorYN>,
    frame_size: (u32, u32),
}

#[cfg(feature = "opencv")]
impl YuNetDetector {
    pub fn new(model_path: &Path, frame_width: u32, frame_height: u32) -> MediaResult<Self> {
        use opencv::dnn::{DNN_BACKEND_DEFAULT, DNN_BACKEND_OPENCV, DNN_TARGET_CPU};
        use opencv::objdetect::FaceDetectorYN;

        let model = model_path.to_string_lossy();
        let size = opencv::core::Size::new(frame_width as i32, frame_height as i32);
        let mut last_error = String::new();

        for (backend, name) in [(DNN_BACKEND_DEFAULT, "default"), (DNN_BACKEND_OPENCV, "opencv")] {
            match FaceDetectorYN::create(
                &model,
                "",
                size,
                SCORE_THRESHOLD,
                NMS_THRESHOLD,
                TOP_K,
                backend,
                DNN_TARGET_CPU,
            ) {
                Ok(detector) => {
                    info!(
                        "YuNet detector initialized: {}x{}, backend={}",
                        frame_width, frame_height, name
                    );
                    return Ok(Self {
                        detector,
                        frame_size: (frame_width, frame_height),
                    });
                }
                Err(e) => {
                    warn!("YuNet {} backend failed: {}", name, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(MediaError::detection_failed(format!(
            "Failed to create YuNet detector with any backend: {}",
            last_error
        )))
    }

    fn to_bgr_mat(frame: &RgbImage) -> MediaResult<opencv::core::Mat> {
        use opencv::core::{Mat, Scalar, CV_8UC3};
        use opencv::imgproc;
        use opencv::prelude::MatTrait;

        let (w, h) = frame.dimensions();
        let mut rgb = Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC3, Scalar::all(0.0))
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;
        rgb.data_bytes_mut()
            .map_err(|e| MediaError::detection_failed(e.to_string()))?
            .copy_from_slice(frame.as_raw());

        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;
        Ok(bgr)
    }
}

#[cfg(feature = "opencv")]
impl FaceDetector for YuNetDetector {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        use opencv::core::Mat;
        use opencv::prelude::{FaceDetectorYNTrait, MatTraitConst};

        if frame.dimensions() != self.frame_size {
            return Err(MediaError::detection_failed(format!(
                "frame is {:?}, detector sized for {:?}",
                frame.dimensions(),
                self.frame_size
            )));
        }

        let bgr = Self::to_bgr_mat(frame)?;
        let mut faces = Mat::default();
        self.detector
            .detect(&bgr, &mut faces)
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;

        // Row layout: x, y, w, h, five landmark pairs, score.
        let mut boxes = Vec::with_capacity(faces.rows().max(0) as usize);
        for i in 0..faces.rows() {
            let read = |col| faces.at_2d::<f32>(i, col).map(|v| *v);
            let (Ok(x), Ok(y), Ok(w), Ok(h)) = (read(0), read(1), read(2), read(3)) else {
                continue;
            };
            if w <= 0.0 || h <= 0.0 {
                continue;
            }
            boxes.push(BoundingBox::new(
                x.round() as i32,
                y.round() as i32,
                w.round() as i32,
                h.round() as i32,
            ));
        }

        debug!("YuNet detected {} faces", boxes.len());
        Ok(boxes)
    }
}

/// Stub for when OpenCV is not available.
#[cfg(not(feature = "opencv"))]
pub struct YuNetDetector;

#[cfg(not(feature = "opencv"))]
impl YuNetDetector {
    pub fn new(_model_path: &Path, _frame_width: u32, _frame_height: u32) -> MediaResult<Self> {
        Err(MediaError::detection_failed("OpenCV feature not enabled"))
    }
}

#[cfg(not(feature = "opencv"))]
impl FaceDetector for YuNetDetector {
    fn detect(&mut self, _frame: &image::RgbImage) -> MediaResult<Vec<redact_models::BoundingBox>> {
        Err(MediaError::detection_failed("OpenCV feature not enabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_missing_model() {
        let err = YuNetFactory::new("/nonexistent/yunet.onnx").unwrap_err();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_stub_reports_missing_feature() {
        let err = YuNetDetector::new(Path::new("model.onnx"), 640, 480)
            .err()
            .expect("stub must fail");
        assert!(matches!(err, MediaError::DetectionFailed(_)));
    }
}
