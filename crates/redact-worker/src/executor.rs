//! Job executor.
//!
//! Runs one admitted job end to end: workspace, payload fetch, the media
//! pipeline for its kind, result delivery, cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use redact_media::{
    anonymize_voice, redact_image_file, DetectorFactory, FfmpegTranscoder, Transcoder,
    VideoRedactionPipeline,
};
use redact_models::{JobKind, JobOutcome};
use redact_queue::JobTicket;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};

use crate::config::WorkerConfig;
use crate::logging::JobLogger;
use crate::transport::{PayloadStore, Transport};
use crate::workspace::JobWorkspace;

/// Image formats the encoder can write back in kind.
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".bmp"];

/// Executes admitted jobs on at most `max_concurrent_jobs` workers.
pub struct JobExecutor {
    work_dir: PathBuf,
    transcode_timeout: Duration,
    pipeline: VideoRedactionPipeline,
    detectors: Arc<dyn DetectorFactory>,
    transcoder: Arc<dyn Transcoder>,
    store: Arc<dyn PayloadStore>,
    transport: Arc<dyn Transport>,
    job_semaphore: Arc<Semaphore>,
}

impl JobExecutor {
    pub fn new(
        config: &WorkerConfig,
        detectors: Arc<dyn DetectorFactory>,
        store: Arc<dyn PayloadStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            transcode_timeout: config.transcode_timeout,
            pipeline: VideoRedactionPipeline::new(config.pipeline_config()),
            detectors,
            transcoder: Arc::new(FfmpegTranscoder::new(config.transcode_timeout.as_secs())),
            store,
            transport,
            job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run `ticket` to a terminal outcome and deliver it.
    ///
    /// The job's workspace is gone by the time this returns, whatever the
    /// outcome.
    pub async fn execute(&self, ticket: &JobTicket, cancel: &CancellationToken) -> JobOutcome {
        let logger = JobLogger::new(&ticket.job_id, ticket.user_id, ticket.kind);
        let span = logger.create_span();

        async {
            let _permit = match self.job_semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return JobOutcome::failed("Executor is shut down"),
            };

            logger.log_start(&format!(
                "{:.1} MB, estimated {} s",
                ticket.file.size_mb(),
                ticket.estimated_secs
            ));

            let workspace = match JobWorkspace::create(&self.work_dir, &ticket.job_id) {
                Ok(ws) => ws,
                Err(e) => {
                    logger.log_error(&format!("workspace: {e}"));
                    let outcome = JobOutcome::failed(e.to_string());
                    self.deliver(ticket, &outcome).await;
                    return outcome;
                }
            };

            let outcome = self.process(ticket, &workspace, cancel, &logger).await;
            match &outcome {
                JobOutcome::Success { .. } => logger.log_completion("success"),
                JobOutcome::SuccessDegraded { reason, .. } => {
                    logger.log_warning(&format!("delivered without audio remux: {reason}"))
                }
                JobOutcome::Cancelled => logger.log_completion("cancelled"),
                JobOutcome::Failed { reason } => logger.log_error(reason),
            }

            self.deliver(ticket, &outcome).await;
            workspace.close();
            outcome
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        ticket: &JobTicket,
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
        logger: &JobLogger,
    ) -> JobOutcome {
        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return JobOutcome::Cancelled,
            fetched = self.store.fetch(&ticket.file, workspace.path()) => fetched,
        };
        let input = match fetched {
            Ok(path) => path,
            Err(e) => return JobOutcome::failed(e.to_string()),
        };

        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        logger.log_progress("payload fetched");

        match ticket.kind {
            JobKind::Image => {
                let output = workspace.output_path(image_extension(&input));
                redact_image_file(
                    &input,
                    &output,
                    self.detectors.as_ref(),
                    self.pipeline.config().tracker.expand_ratio,
                    cancel,
                )
                .await
            }
            JobKind::VideoFace => {
                let output = workspace.output_path(".mp4");
                self.pipeline
                    .run(
                        &input,
                        &output,
                        self.detectors.as_ref(),
                        self.transcoder.as_ref(),
                        cancel,
                    )
                    .await
            }
            JobKind::VideoVoice => {
                let output = workspace.output_path(".mp4");
                anonymize_voice(
                    &input,
                    &output,
                    ticket.mode.voice_level,
                    self.transcode_timeout.as_secs(),
                    cancel,
                )
                .await
            }
        }
    }

    async fn deliver(&self, ticket: &JobTicket, outcome: &JobOutcome) {
        if let Err(e) = self
            .transport
            .deliver_result(ticket.chat_id, ticket.kind, outcome)
            .await
        {
            warn!(
                chat_id = %ticket.chat_id,
                job_id = %ticket.job_id,
                error = %e,
                "Failed to deliver result"
            );
        }
    }

    /// Stop admitting work to the executor.
    pub fn close(&self) {
        self.job_semaphore.close();
    }
}

/// Keep the input's image format when the encoder supports it.
fn image_extension(input: &Path) -> &'static str {
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|known| *known == ext)
        .unwrap_or(".jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension(Path::new("/w/input.PNG")), ".png");
        assert_eq!(image_extension(Path::new("/w/input.jpeg")), ".jpeg");
        assert_eq!(image_extension(Path::new("/w/input.heic")), ".jpg");
        assert_eq!(image_extension(Path::new("/w/input")), ".jpg");
    }
}
