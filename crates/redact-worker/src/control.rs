//! JSON-lines control commands for driving the coordinator from a pipe.

use std::path::{Path, PathBuf};

use redact_media::probe_video;
use redact_models::{
    ChatId, FileDescriptor, JobId, MediaType, ModeMetadata, ServerStatus, UserId,
};
use redact_queue::{CancelEffect, Submission, SubmissionLimits, SubmitDecision};
use serde::{Deserialize, Serialize};

use crate::coordinator::JobCoordinator;
use crate::error::{WorkerError, WorkerResult};
use crate::transport::LocalFileStore;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// One request read from the control pipe.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlCommand {
    Submit {
        user_id: UserId,
        /// Defaults to the user's id
        #[serde(default)]
        chat_id: Option<ChatId>,
        path: PathBuf,
        #[serde(default)]
        mode: ModeMetadata,
    },
    Cancel {
        user_id: UserId,
    },
    Status,
    Cooldown {
        user_id: UserId,
    },
    ClearCooldown {
        user_id: UserId,
    },
}

/// Reply written back for each command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Admitted { job_id: JobId, estimated_secs: u64 },
    Queued { position: usize, eta_secs: u64, refreshed: bool },
    Rejected { reason: String },
    Withdrawn,
    CancelRequested { job_id: JobId },
    NothingToCancel,
    Status(ServerStatus),
    Cooldown { remaining_secs: u64 },
    CooldownCleared { existed: bool },
    Error { message: String },
}

/// Media type from a file extension; anything not a known image is a video.
pub fn media_type_for(path: &Path) -> MediaType {
    let is_image = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()));
    if is_image {
        MediaType::Image
    } else {
        MediaType::Video
    }
}

/// Build a descriptor with the size, duration and dimensions admission needs.
///
/// `reference` is resolved through `store`, so the file described is the
/// one the executor later fetches. The descriptor keeps the reference as given.
pub async fn describe_payload(
    store: &LocalFileStore,
    reference: &Path,
) -> WorkerResult<(MediaType, FileDescriptor)> {
    let content_ref = reference.to_string_lossy();
    let path = store.resolve(&content_ref);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| WorkerError::fetch_failed(format!("{}: {e}", path.display())))?;
    let media = media_type_for(&path);

    let mut file = FileDescriptor::new(content_ref, metadata.len());
    if let Some(name) = path.file_name() {
        file = file.with_file_name(name.to_string_lossy());
    }

    let file = match media {
        MediaType::Video => {
            let info = probe_video(&path).await?;
            file.with_duration(info.duration.ceil() as u32)
                .with_dimensions(info.width, info.height)
        }
        MediaType::Image => {
            let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(path))
                .await
                .map_err(|e| WorkerError::job_failed(format!("Image probe panicked: {e}")))?
                .map_err(|e| WorkerError::fetch_failed(e.to_string()))?;
            file.with_dimensions(width, height)
        }
    };

    Ok((media, file))
}

/// Run one command against the coordinator.
///
/// Submitted paths are resolved through `store`, the same store the
/// coordinator's executor fetches payloads from.
pub async fn handle(
    coordinator: &JobCoordinator,
    store: &LocalFileStore,
    command: ControlCommand,
) -> ControlReply {
    match command {
        ControlCommand::Submit {
            user_id,
            chat_id,
            path,
            mode,
        } => {
            let (media, file) = match describe_payload(store, &path).await {
                Ok(described) => described,
                Err(e) => {
                    return ControlReply::Error {
                        message: e.to_string(),
                    }
                }
            };
            let kind = match SubmissionLimits::resolve_kind(media, &mode) {
                Ok(kind) => kind,
                Err(rejection) => {
                    return ControlReply::Rejected {
                        reason: rejection.to_string(),
                    }
                }
            };

            let submission = Submission {
                user_id,
                chat_id: chat_id.unwrap_or(ChatId(user_id.0)),
                kind,
                file,
                mode,
            };
            match coordinator.submit(submission).await {
                SubmitDecision::Admitted(ticket) => ControlReply::Admitted {
                    job_id: ticket.job_id,
                    estimated_secs: ticket.estimated_secs,
                },
                SubmitDecision::Queued {
                    position,
                    eta_secs,
                    refreshed,
                } => ControlReply::Queued {
                    position,
                    eta_secs,
                    refreshed,
                },
                SubmitDecision::Rejected(rejection) => ControlReply::Rejected {
                    reason: rejection.to_string(),
                },
            }
        }
        ControlCommand::Cancel { user_id } => match coordinator.request_cancel(user_id).await {
            CancelEffect::Nothing => ControlReply::NothingToCancel,
            CancelEffect::Withdrawn { .. } => ControlReply::Withdrawn,
            CancelEffect::SignalActive { job_id } => ControlReply::CancelRequested { job_id },
        },
        ControlCommand::Status => ControlReply::Status(coordinator.status().await),
        ControlCommand::Cooldown { user_id } => ControlReply::Cooldown {
            remaining_secs: coordinator.cooldown_remaining(user_id).await,
        },
        ControlCommand::ClearCooldown { user_id } => ControlReply::CooldownCleared {
            existed: coordinator.clear_cooldown(user_id).await,
        },
    }
}

/// Parse one input line, answering malformed input with an error reply.
pub fn parse_line(line: &str) -> Result<ControlCommand, ControlReply> {
    serde_json::from_str(line).map_err(|e| ControlReply::Error {
        message: format!("Invalid command: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::{ProcessingMode, VoiceLevel};

    #[test]
    fn test_parse_submit_with_defaults() {
        let cmd = parse_line(r#"{"op":"submit","user_id":5,"path":"/tmp/a.mp4"}"#).unwrap();
        match cmd {
            ControlCommand::Submit {
                user_id,
                chat_id,
                mode,
                ..
            } => {
                assert_eq!(user_id, UserId(5));
                assert_eq!(chat_id, None);
                assert_eq!(mode, ModeMetadata::default());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_voice_mode() {
        let cmd = parse_line(
            r#"{"op":"submit","user_id":1,"path":"v.mp4","mode":{"mode":"voice","voice_level":"secure"}}"#,
        )
        .unwrap();
        let ControlCommand::Submit { mode, .. } = cmd else {
            panic!("expected submit");
        };
        assert_eq!(mode.mode, ProcessingMode::Voice);
        assert_eq!(mode.voice_level, VoiceLevel::Secure);
    }

    #[test]
    fn test_parse_error_reply() {
        let reply = parse_line(r#"{"op":"explode"}"#).unwrap_err();
        assert!(matches!(reply, ControlReply::Error { .. }));
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(Path::new("a.JPG")), MediaType::Image);
        assert_eq!(media_type_for(Path::new("a.png")), MediaType::Image);
        assert_eq!(media_type_for(Path::new("a.mov")), MediaType::Video);
        assert_eq!(media_type_for(Path::new("noext")), MediaType::Video);
    }

    #[test]
    fn test_reply_serialization() {
        let json = serde_json::to_value(ControlReply::Queued {
            position: 1,
            eta_secs: 25,
            refreshed: false,
        })
        .unwrap();
        assert_eq!(json["reply"], "queued");
        assert_eq!(json["position"], 1);
    }

    #[tokio::test]
    async fn test_describe_image_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        image::RgbImage::new(40, 30).save(&path).unwrap();

        let (media, file) = describe_payload(&LocalFileStore::new("."), &path)
            .await
            .unwrap();
        assert_eq!(media, MediaType::Image);
        assert_eq!((file.width, file.height), (Some(40), Some(30)));
        assert_eq!(file.file_name.as_deref(), Some("face.png"));
    }

    #[tokio::test]
    async fn test_describe_relative_payload_under_store_root() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::new(24, 16)
            .save(dir.path().join("pic.png"))
            .unwrap();
        let store = LocalFileStore::new(dir.path());

        let (media, file) = describe_payload(&store, Path::new("pic.png"))
            .await
            .unwrap();
        assert_eq!(media, MediaType::Image);
        assert_eq!(file.content_ref, "pic.png");
        assert_eq!((file.width, file.height), (Some(24), Some(16)));
    }
}
