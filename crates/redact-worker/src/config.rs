//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use redact_media::PipelineConfig;
use redact_queue::{EtaModel, SchedulerConfig, SubmissionLimits};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Cooldown after a successful job
    pub cooldown: Duration,
    /// Parent directory of per-job workspaces
    pub work_dir: PathBuf,
    pub limits: SubmissionLimits,
    pub eta: EtaModel,
    /// Percent trimmed from each edge of redacted video
    pub edge_crop_percent: u32,
    /// Timeout for external FFmpeg steps
    pub transcode_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Port for the Prometheus exporter, if enabled
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            cooldown: Duration::from_secs(30),
            work_dir: std::env::temp_dir().join("redact"),
            limits: SubmissionLimits::default(),
            eta: EtaModel::default(),
            edge_crop_percent: 2,
            transcode_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_or("REDACT_MAX_JOBS", defaults.max_concurrent_jobs).max(1),
            cooldown: Duration::from_secs(env_or("REDACT_COOLDOWN_SECS", 30)),
            work_dir: std::env::var("REDACT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            limits: SubmissionLimits {
                max_video_mb: env_or("REDACT_MAX_VIDEO_MB", defaults.limits.max_video_mb),
                max_video_secs: env_or("REDACT_MAX_VIDEO_SECS", defaults.limits.max_video_secs),
                max_image_mb: env_or("REDACT_MAX_IMAGE_MB", defaults.limits.max_image_mb),
                max_image_dimension: env_or(
                    "REDACT_MAX_IMAGE_DIMENSION",
                    defaults.limits.max_image_dimension,
                ),
            },
            eta: EtaModel {
                video_secs_per_mb: env_or("REDACT_VIDEO_SECS_PER_MB", defaults.eta.video_secs_per_mb),
                image_secs_per_mb: env_or("REDACT_IMAGE_SECS_PER_MB", defaults.eta.image_secs_per_mb),
                ..defaults.eta
            },
            edge_crop_percent: env_or("REDACT_EDGE_CROP_PERCENT", defaults.edge_crop_percent),
            transcode_timeout: Duration::from_secs(env_or("REDACT_TRANSCODE_TIMEOUT_SECS", 300)),
            shutdown_timeout: Duration::from_secs(env_or("REDACT_SHUTDOWN_TIMEOUT_SECS", 30)),
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_jobs: self.max_concurrent_jobs,
            cooldown_secs: self.cooldown.as_secs(),
            limits: self.limits.clone(),
            eta: self.eta.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            edge_crop_percent: self.edge_crop_percent,
            transcode_timeout_secs: self.transcode_timeout.as_secs(),
            ..PipelineConfig::default()
        }
    }
}
