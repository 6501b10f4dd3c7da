//! End-to-end runs through real FFmpeg pipes.

use image::RgbImage;
use redact_media::{
    anonymize_voice, probe_video, DetectorFactory, FaceDetector, FfmpegCommand, FfmpegRunner,
    FfmpegTranscoder, MediaResult, PipelineConfig, VideoRedactionPipeline,
};
use redact_models::{BoundingBox, JobOutcome, VoiceLevel};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct CenterFace;

impl FaceDetector for CenterFace {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        let (w, h) = frame.dimensions();
        Ok(vec![BoundingBox::new(w as i32 / 3, h as i32 / 3, w as i32 / 3, h as i32 / 3)])
    }
}

struct CenterFaces;

impl DetectorFactory for CenterFaces {
    fn create(&self, _: u32, _: u32) -> MediaResult<Box<dyn FaceDetector>> {
        Ok(Box::new(CenterFace))
    }
}

async fn make_clip(path: &Path) {
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error"])
        .args(["-f", "lavfi", "-i", "testsrc=size=320x240:rate=15:duration=1"])
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=1"])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest"])
        .arg(path)
        .status()
        .await
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_video_redaction_end_to_end() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("redacted.mp4");
    make_clip(&input).await;

    let pipeline = VideoRedactionPipeline::new(PipelineConfig::default());
    let outcome = pipeline
        .run(
            &input,
            &output,
            &CenterFaces,
            &FfmpegTranscoder::new(60),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome, JobOutcome::Success { output: output.clone() });
    assert!(!VideoRedactionPipeline::temp_path_for(&output).exists());

    let info = probe_video(&output).await.unwrap();
    // 2% of 320x240 is 6x4 per side.
    assert_eq!((info.width, info.height), (308, 232));
    assert!(info.has_audio);
}

/// Detector that records the size of every frame it sees.
struct FrameSizes(Arc<Mutex<Vec<(u32, u32)>>>);

impl FaceDetector for FrameSizes {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        self.0.lock().unwrap().push(frame.dimensions());
        CenterFace.detect(frame)
    }
}

struct RecordingFaces(Arc<Mutex<Vec<(u32, u32)>>>);

impl DetectorFactory for RecordingFaces {
    fn create(&self, _: u32, _: u32) -> MediaResult<Box<dyn FaceDetector>> {
        Ok(Box::new(FrameSizes(self.0.clone())))
    }
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_rotated_clip_decodes_upright() {
    let dir = TempDir::new().unwrap();
    let plain = dir.path().join("plain.mp4");
    let rotated = dir.path().join("rotated.mp4");
    let output = dir.path().join("redacted.mp4");
    make_clip(&plain).await;

    // Tag the stream with a quarter-turn display matrix, as phones do.
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-display_rotation:v:0", "90", "-i"])
        .arg(&plain)
        .args(["-c", "copy"])
        .arg(&rotated)
        .status()
        .await
        .unwrap();
    assert!(status.success());

    let info = probe_video(&rotated).await.unwrap();
    assert_eq!(info.rotation % 180, 90);
    assert_eq!((info.width, info.height), (240, 320));

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let outcome = VideoRedactionPipeline::new(PipelineConfig::default())
        .run(
            &rotated,
            &output,
            &RecordingFaces(sizes.clone()),
            &FfmpegTranscoder::new(60),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, JobOutcome::Success { output: output.clone() });

    let sizes = sizes.lock().unwrap().clone();
    assert!(!sizes.is_empty());
    assert!(sizes.iter().all(|&size| size == (240, 320)));

    let info = probe_video(&output).await.unwrap();
    assert_eq!((info.width, info.height), (232, 308));
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_voice_anonymization_end_to_end() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("voice.mp4");
    make_clip(&input).await;

    let outcome = anonymize_voice(
        &input,
        &output,
        VoiceLevel::Secure,
        60,
        &CancellationToken::new(),
    )
    .await;
    assert!(outcome.is_success());
    assert!(probe_video(&output).await.unwrap().has_audio);
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_runner_kills_on_cancel() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let cmd = FfmpegCommand::new("testsrc=duration=600", dir.path().join("long.mp4"))
        .input_arg("-re")
        .input_arg("-f")
        .input_arg("lavfi");

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let err = FfmpegRunner::new().with_cancel(token).run(&cmd).await.unwrap_err();
    assert!(matches!(err, redact_media::MediaError::Cancelled));
}
