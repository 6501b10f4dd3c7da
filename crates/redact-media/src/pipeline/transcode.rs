use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Final encode step that restores the source audio.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Combine `video_only` with the audio of `audio_source` into `output`.
    async fn remux(
        &self,
        video_only: &Path,
        audio_source: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<()>;
}

/// H.264/AAC re-encode through the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    timeout_secs: u64,
}

impl FfmpegTranscoder {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// The remux command: audio is optional in the source.
    pub fn command(video_only: &Path, audio_source: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(video_only, output)
            .add_input(audio_source)
            .video_codec("libx264")
            .preset("fast")
            .crf(23)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec("aac")
            .audio_bitrate("128k")
            .map("0:v:0")
            .map("1:a:0?")
            .strip_metadata()
            .output_args(["-fflags", "+bitexact", "-movflags", "+faststart", "-shortest"])
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(300)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn remux(
        &self,
        video_only: &Path,
        audio_source: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let cmd = Self::command(video_only, audio_source, output);
        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .with_timeout(self.timeout_secs)
            .run(&cmd)
            .await
    }
}
