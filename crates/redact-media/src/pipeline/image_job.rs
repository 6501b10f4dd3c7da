use image::RgbImage;
use redact_models::JobOutcome;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::detection::{DetectorFactory, FaceDetector};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::discard;
use crate::redaction::RegionRenderer;

/// Detect once and blur every face in a still frame. Returns the face count.
pub fn redact_image_frame(
    frame: &mut RgbImage,
    detector: &mut dyn FaceDetector,
    renderer: &RegionRenderer,
    expand_ratio: f64,
) -> MediaResult<usize> {
    let faces = detector.detect(frame)?;
    let regions: Vec<_> = faces.iter().map(|b| b.expand(expand_ratio)).collect();
    renderer.render_all(frame, &regions);
    Ok(faces.len())
}

/// Redact a still image file. The encoder is chosen from `output`'s extension.
pub async fn redact_image_file(
    input: &Path,
    output: &Path,
    detectors: &dyn DetectorFactory,
    expand_ratio: f64,
    cancel: &CancellationToken,
) -> JobOutcome {
    match try_redact(input, output, detectors, expand_ratio, cancel).await {
        Ok(Some(faces)) => {
            info!(faces, output = %output.display(), "Image redacted");
            JobOutcome::Success {
                output: output.to_path_buf(),
            }
        }
        Ok(None) => {
            discard(&[output]).await;
            JobOutcome::Cancelled
        }
        Err(e) => {
            warn!(error = %e, "Image redaction failed");
            discard(&[output]).await;
            JobOutcome::failed(e.to_string())
        }
    }
}

async fn try_redact(
    input: &Path,
    output: &Path,
    detectors: &dyn DetectorFactory,
    expand_ratio: f64,
    cancel: &CancellationToken,
) -> MediaResult<Option<usize>> {
    if cancel.is_cancelled() {
        return Ok(None);
    }
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let input_path = input.to_path_buf();
    let frame = blocking(move || Ok(image::open(&input_path)?.to_rgb8())).await?;

    if cancel.is_cancelled() {
        return Ok(None);
    }

    let (width, height) = frame.dimensions();
    let mut detector = detectors.create(width, height)?;
    let (frame, faces) = blocking(move || {
        let mut frame = frame;
        let faces = redact_image_frame(
            &mut frame,
            detector.as_mut(),
            &RegionRenderer::new(),
            expand_ratio,
        )?;
        Ok((frame, faces))
    })
    .await?;

    if cancel.is_cancelled() {
        return Ok(None);
    }

    let output_path = output.to_path_buf();
    blocking(move || Ok(frame.save(&output_path)?)).await?;
    Ok(Some(faces))
}

async fn blocking<T, F>(f: F) -> MediaResult<T>
where
    F: FnOnce() -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::internal(format!("blocking task failed: {e}")))?
}
