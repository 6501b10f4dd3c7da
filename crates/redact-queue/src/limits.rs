//! Synchronous admission limits and job duration estimates.

use redact_models::{FileDescriptor, JobKind, MediaType, ModeMetadata};
use serde::{Deserialize, Serialize};

use crate::error::Rejection;

/// Size, duration and resolution limits checked before any queueing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionLimits {
    pub max_video_mb: f64,
    pub max_video_secs: u32,
    pub max_image_mb: f64,
    pub max_image_dimension: u32,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_video_mb: 100.0,
            max_video_secs: 30,
            max_image_mb: 10.0,
            max_image_dimension: 1920,
        }
    }
}

impl SubmissionLimits {
    /// Pick the job kind for a payload, refusing voice mode on images.
    pub fn resolve_kind(media: MediaType, mode: &ModeMetadata) -> Result<JobKind, Rejection> {
        JobKind::for_media(media, mode.mode).ok_or(Rejection::VoiceNeedsVideo)
    }

    /// Check a payload against the limits for its kind.
    ///
    /// Unknown duration or dimensions pass; the transport may not report them.
    pub fn validate(&self, kind: JobKind, file: &FileDescriptor) -> Result<(), Rejection> {
        let size_mb = file.size_mb();

        if kind.is_video() {
            if size_mb > self.max_video_mb {
                return Err(Rejection::FileTooLarge {
                    size_mb,
                    limit_mb: self.max_video_mb,
                });
            }
            if let Some(duration) = file.duration_secs {
                if duration > self.max_video_secs {
                    return Err(Rejection::VideoTooLong {
                        duration_secs: duration,
                        limit_secs: self.max_video_secs,
                    });
                }
            }
        } else {
            if size_mb > self.max_image_mb {
                return Err(Rejection::FileTooLarge {
                    size_mb,
                    limit_mb: self.max_image_mb,
                });
            }
            if let (Some(width), Some(height)) = (file.width, file.height) {
                if width > self.max_image_dimension || height > self.max_image_dimension {
                    return Err(Rejection::ResolutionTooHigh {
                        width,
                        height,
                        limit: self.max_image_dimension,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Linear processing-time model used for ETAs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaModel {
    pub video_secs_per_mb: f64,
    pub image_secs_per_mb: f64,
    pub video_floor_secs: f64,
    pub image_floor_secs: f64,
}

impl Default for EtaModel {
    fn default() -> Self {
        Self {
            video_secs_per_mb: 2.5,
            image_secs_per_mb: 0.5,
            video_floor_secs: 5.0,
            image_floor_secs: 2.0,
        }
    }
}

impl EtaModel {
    /// Estimated processing time `T` for one job.
    pub fn job_secs(&self, kind: JobKind, size_mb: f64) -> f64 {
        if kind.is_video() {
            (size_mb * self.video_secs_per_mb).max(self.video_floor_secs)
        } else {
            (size_mb * self.image_secs_per_mb).max(self.image_floor_secs)
        }
    }

    /// Wait for 1-indexed `position` given `active` running jobs:
    /// half of `T` per running job plus `T` per entry ahead.
    pub fn eta_secs(&self, active: usize, position: usize, job_secs: f64) -> u64 {
        if position == 0 {
            return 0;
        }
        let wait = active as f64 * job_secs / 2.0 + (position - 1) as f64 * job_secs;
        wait as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::ProcessingMode;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_video_limits() {
        let limits = SubmissionLimits::default();
        let ok = FileDescriptor::new("v", 50 * MB).with_duration(30);
        assert!(limits.validate(JobKind::VideoFace, &ok).is_ok());

        let big = FileDescriptor::new("v", 101 * MB);
        assert!(matches!(
            limits.validate(JobKind::VideoVoice, &big),
            Err(Rejection::FileTooLarge { .. })
        ));

        let long = FileDescriptor::new("v", MB).with_duration(31);
        assert_eq!(
            limits.validate(JobKind::VideoFace, &long),
            Err(Rejection::VideoTooLong {
                duration_secs: 31,
                limit_secs: 30
            })
        );
    }

    #[test]
    fn test_image_limits() {
        let limits = SubmissionLimits::default();
        let wide = FileDescriptor::new("i", MB).with_dimensions(1921, 1080);
        assert!(matches!(
            limits.validate(JobKind::Image, &wide),
            Err(Rejection::ResolutionTooHigh { .. })
        ));

        let heavy = FileDescriptor::new("i", 11 * MB);
        assert!(matches!(
            limits.validate(JobKind::Image, &heavy),
            Err(Rejection::FileTooLarge { .. })
        ));

        let fine = FileDescriptor::new("i", 2 * MB).with_dimensions(1920, 1920);
        assert!(limits.validate(JobKind::Image, &fine).is_ok());
    }

    #[test]
    fn test_resolve_kind() {
        let voice = ModeMetadata {
            mode: ProcessingMode::Voice,
            ..ModeMetadata::default()
        };
        assert_eq!(
            SubmissionLimits::resolve_kind(MediaType::Image, &voice),
            Err(Rejection::VoiceNeedsVideo)
        );
        assert_eq!(
            SubmissionLimits::resolve_kind(MediaType::Video, &voice),
            Ok(JobKind::VideoVoice)
        );
    }

    #[test]
    fn test_job_secs_floors() {
        let eta = EtaModel::default();
        assert_eq!(eta.job_secs(JobKind::VideoFace, 10.0), 25.0);
        assert_eq!(eta.job_secs(JobKind::VideoFace, 1.0), 5.0);
        assert_eq!(eta.job_secs(JobKind::Image, 1.0), 2.0);
        assert_eq!(eta.job_secs(JobKind::Image, 8.0), 4.0);
    }

    #[test]
    fn test_eta_formula() {
        let eta = EtaModel::default();
        assert_eq!(eta.eta_secs(2, 1, 25.0), 25);
        assert_eq!(eta.eta_secs(2, 3, 25.0), 75);
        assert_eq!(eta.eta_secs(1, 1, 25.0), 12);
        assert_eq!(eta.eta_secs(2, 0, 25.0), 0);
    }
}
