use redact_models::JobOutcome;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EdgeCrop, FrameSink, FrameSource, PipelineConfig, Transcoder};
use crate::detection::{DetectorFactory, FaceDetector};
use crate::error::{MediaError, MediaResult};
use crate::ffmpeg_io::{FfmpegFrameReader, FfmpegFrameWriter};
use crate::fs_utils::{discard, move_file};
use crate::metrics::{record_frame_processed, record_frame_skipped, record_remux_fallback};
use crate::probe::probe_video;
use crate::redaction::RegionRenderer;
use crate::tracking::TrackAssociationEngine;

/// Counters from one pass over the frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames written to the sink
    pub frames: u64,
    /// Frames written without redaction because a per-frame step failed
    pub skipped: u64,
    /// Distinct tracks created over the run
    pub tracks_created: u64,
}

/// How the frame loop stopped, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoopEnd {
    Completed(FrameStats),
    Cancelled(FrameStats),
}

/// Everything the frame loop consumes for one video job.
pub struct VideoIo {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
    pub detector: Box<dyn FaceDetector>,
    /// File the sink writes the video-only intermediate to
    pub temp_path: PathBuf,
}

/// Redacts faces in a video and restores its audio.
#[derive(Debug, Clone, Default)]
pub struct VideoRedactionPipeline {
    config: PipelineConfig,
    renderer: RegionRenderer,
}

impl VideoRedactionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            renderer: RegionRenderer::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Intermediate path next to `output`: `clip.mp4` becomes `clip.temp.mp4`.
    pub fn temp_path_for(output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        output.with_file_name(format!("{stem}.temp.mp4"))
    }

    /// Probe `input`, open FFmpeg pipes and run the whole job.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        detectors: &dyn DetectorFactory,
        transcoder: &dyn Transcoder,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        match self.open(input, output, detectors).await {
            Ok(io) => self.process(io, input, output, transcoder, cancel).await,
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Cannot start video redaction");
                JobOutcome::failed(e.to_string())
            }
        }
    }

    async fn open(
        &self,
        input: &Path,
        output: &Path,
        detectors: &dyn DetectorFactory,
    ) -> MediaResult<VideoIo> {
        let info = probe_video(input).await?;
        let crop = EdgeCrop::new(info.width, info.height, self.config.edge_crop_percent)?;
        let (out_w, out_h) = crop.output_size();
        let temp_path = Self::temp_path_for(output);

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            duration = info.duration,
            "Opening video for redaction"
        );

        let detector = detectors.create(info.width, info.height)?;
        let source = FfmpegFrameReader::open(input, info.width, info.height)?;
        let sink = FfmpegFrameWriter::create(&temp_path, out_w, out_h, info.fps)?;

        Ok(VideoIo {
            source: Box::new(source),
            sink: Box::new(sink),
            detector,
            temp_path,
        })
    }

    /// Run the frame loop on a blocking thread, then remux.
    pub async fn process(
        &self,
        io: VideoIo,
        audio_source: &Path,
        output: &Path,
        transcoder: &dyn Transcoder,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let temp_path = io.temp_path.clone();
        let pipeline = self.clone();
        let token = cancel.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let VideoIo {
                mut source,
                mut sink,
                mut detector,
                ..
            } = io;
            pipeline.run_frame_loop(source.as_mut(), sink.as_mut(), detector.as_mut(), &token)
        })
        .await;

        let loop_result = joined
            .unwrap_or_else(|e| Err(MediaError::internal(format!("frame worker panicked: {e}"))));

        self.finish(loop_result, &temp_path, audio_source, output, transcoder, cancel)
            .await
    }

    /// Decode, redact and encode every frame.
    ///
    /// Cancellation is checked once before each frame is read. Per-frame
    /// detection faults leave that frame unredacted; source and sink faults
    /// end the loop with an error.
    pub fn run_frame_loop(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        detector: &mut dyn FaceDetector,
        cancel: &CancellationToken,
    ) -> MediaResult<FrameLoopEnd> {
        let (width, height) = source.frame_size();
        let crop = EdgeCrop::new(width, height, self.config.edge_crop_percent)?;
        let mut engine = TrackAssociationEngine::new(self.config.tracker.clone());
        let mut stats = FrameStats::default();

        loop {
            if cancel.is_cancelled() {
                info!(frames = stats.frames, "Video redaction cancelled");
                sink.abort();
                return Ok(FrameLoopEnd::Cancelled(stats));
            }

            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    sink.abort();
                    return Err(into_fatal(e, MediaError::SourceUnreadable));
                }
            };

            match detector.detect(&frame) {
                Ok(detections) => {
                    let regions = engine.update(&frame, &detections);
                    stats.tracks_created = engine.tracks_created();
                    self.renderer.render_all(&mut frame, &regions);
                }
                Err(e) if e.is_fatal_io() => {
                    sink.abort();
                    return Err(e);
                }
                Err(e) => {
                    debug!(frame = stats.frames, error = %e, "Frame left unredacted");
                    stats.skipped += 1;
                    record_frame_skipped("detection");
                }
            }

            if let Err(e) = sink.write_frame(&crop.apply(frame)) {
                sink.abort();
                return Err(into_fatal(e, MediaError::SinkUnwritable));
            }

            stats.frames += 1;
            record_frame_processed();
            if stats.frames % 100 == 0 {
                debug!(frames = stats.frames, tracks = engine.tracks().len(), "Redaction progress");
            }
        }

        sink.finish().map_err(|e| into_fatal(e, MediaError::SinkUnwritable))?;
        info!(
            frames = stats.frames,
            skipped = stats.skipped,
            tracks = stats.tracks_created,
            "Frame loop complete"
        );
        Ok(FrameLoopEnd::Completed(stats))
    }

    async fn finish(
        &self,
        loop_result: MediaResult<FrameLoopEnd>,
        temp_path: &Path,
        audio_source: &Path,
        output: &Path,
        transcoder: &dyn Transcoder,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        match loop_result {
            Ok(FrameLoopEnd::Completed(_)) => {}
            Ok(FrameLoopEnd::Cancelled(_)) => {
                discard(&[temp_path, output]).await;
                return JobOutcome::Cancelled;
            }
            Err(e) => {
                warn!(error = %e, "Video redaction failed");
                discard(&[temp_path, output]).await;
                return JobOutcome::failed(e.to_string());
            }
        }

        match transcoder.remux(temp_path, audio_source, output, cancel).await {
            Ok(()) => {
                discard(&[temp_path]).await;
                JobOutcome::Success {
                    output: output.to_path_buf(),
                }
            }
            Err(MediaError::Cancelled) => {
                discard(&[temp_path, output]).await;
                JobOutcome::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "Remux failed, delivering video without audio");
                record_remux_fallback();
                discard(&[output]).await;
                match move_file(temp_path, output).await {
                    Ok(()) => JobOutcome::SuccessDegraded {
                        output: output.to_path_buf(),
                        reason: e.to_string(),
                    },
                    Err(move_err) => {
                        discard(&[temp_path]).await;
                        JobOutcome::failed(move_err.to_string())
                    }
                }
            }
        }
    }
}

/// Keep already-fatal errors, wrap everything else with `wrap`.
fn into_fatal(e: MediaError, wrap: fn(String) -> MediaError) -> MediaError {
    if e.is_fatal_io() {
        e
    } else {
        wrap(e.to_string())
    }
}
