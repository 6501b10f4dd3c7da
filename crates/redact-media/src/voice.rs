//! Voice anonymization by pitch and tempo shifting.

use rand::Rng;
use redact_models::{JobOutcome, VoiceLevel};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaError;
use crate::fs_utils::discard;

/// Sample rate the filter chain resamples to.
const SAMPLE_RATE: u32 = 44_100;

const FAST_SEMITONES: &[i32] = &[-6, -5, -4, -3, 3, 4, 5, 6];
const SECURE_SEMITONES: &[i32] = &[-8, -7, 7, 8];

/// Randomized shift for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub level: VoiceLevel,
    pub semitones: i32,
    /// Pitch multiplier, `2^(semitones / 12)`
    pub pitch: f64,
    /// Tempo multiplier applied after the pitch shift
    pub tempo: f64,
}

impl VoiceParams {
    /// Draw parameters for `level`.
    pub fn sample<R: Rng + ?Sized>(level: VoiceLevel, rng: &mut R) -> Self {
        let (choices, variation) = match level {
            VoiceLevel::Fast => (FAST_SEMITONES, 0.05),
            VoiceLevel::Secure => (SECURE_SEMITONES, 0.10),
        };
        let semitones = choices[rng.random_range(0..choices.len())];
        let jitter = rng.random_range((1.0 - variation)..(1.0 + variation));
        Self::new(level, semitones, jitter)
    }

    /// Parameters for a fixed semitone shift and tempo jitter.
    pub fn new(level: VoiceLevel, semitones: i32, tempo_jitter: f64) -> Self {
        let pitch = 2f64.powf(semitones as f64 / 12.0);
        let tempo = (1.0 / pitch * tempo_jitter).clamp(0.5, 2.0);
        Self {
            level,
            semitones,
            pitch,
            tempo,
        }
    }

    /// FFmpeg `-af` chain.
    pub fn filter_chain(&self) -> String {
        let mut chain = format!(
            "asetrate={SAMPLE_RATE}*{:.4},aresample={SAMPLE_RATE},atempo={:.4}",
            self.pitch, self.tempo
        );
        if self.level == VoiceLevel::Secure {
            chain.push_str(",highpass=f=100,lowpass=f=8000");
        }
        chain
    }

    /// Full command: audio re-encoded, video stream-copied, metadata dropped.
    pub fn command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .audio_filter(self.filter_chain())
            .video_codec("copy")
            .audio_codec("aac")
            .audio_bitrate("128k")
            .output_args(["-map_metadata", "-1"])
    }
}

/// Anonymize the voice track of `input` into `output`.
pub async fn anonymize_voice(
    input: &Path,
    output: &Path,
    level: VoiceLevel,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> JobOutcome {
    if cancel.is_cancelled() {
        return JobOutcome::Cancelled;
    }
    if !input.exists() {
        return JobOutcome::failed(MediaError::FileNotFound(input.to_path_buf()).to_string());
    }

    let params = VoiceParams::sample(level, &mut rand::rng());
    info!(
        level = ?level,
        semitones = params.semitones,
        tempo = params.tempo,
        "Anonymizing voice"
    );

    let result = FfmpegRunner::new()
        .with_cancel(cancel.clone())
        .with_timeout(timeout_secs)
        .run(&params.command(input, output))
        .await;

    let outcome = match result {
        Ok(()) if cancel.is_cancelled() => JobOutcome::Cancelled,
        Ok(()) => {
            return JobOutcome::Success {
                output: output.to_path_buf(),
            }
        }
        Err(MediaError::Cancelled) => JobOutcome::Cancelled,
        Err(e) => {
            warn!(error = %e, "Voice anonymization failed");
            JobOutcome::failed(e.to_string())
        }
    };

    discard(&[output]).await;
    outcome
}
