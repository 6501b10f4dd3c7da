//! Seams to the chat front end: notifications, result delivery, payloads.

use async_trait::async_trait;
use redact_models::{ChatId, FileDescriptor, JobKind, JobOutcome, MessageRef};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

use crate::error::{NotifyResult, WorkerError, WorkerResult};

/// Outbound messages to users. All calls are best-effort.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Tell a promoted user their job is starting and they should not resubmit.
    async fn notify_turn(&self, chat_id: ChatId) -> NotifyResult<()>;

    /// Show a queued user's position and ETA.
    ///
    /// `message` is the previously sent position message, if any; the
    /// returned reference is the message now showing the position.
    async fn notify_queue_update(
        &self,
        chat_id: ChatId,
        message: Option<MessageRef>,
        position: usize,
        eta_secs: u64,
    ) -> NotifyResult<Option<MessageRef>>;

    /// Send the finished artifact, or explain why there is none.
    async fn deliver_result(
        &self,
        chat_id: ChatId,
        kind: JobKind,
        outcome: &JobOutcome,
    ) -> NotifyResult<()>;
}

/// Resolves a payload reference to a local file.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Materialize `file` inside `dest_dir` and return its path.
    async fn fetch(&self, file: &FileDescriptor, dest_dir: &Path) -> WorkerResult<PathBuf>;
}

/// Payload references are paths, relative to `root` unless absolute.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, content_ref: &str) -> PathBuf {
        let path = Path::new(content_ref);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl PayloadStore for LocalFileStore {
    async fn fetch(&self, file: &FileDescriptor, dest_dir: &Path) -> WorkerResult<PathBuf> {
        let source = self.resolve(&file.content_ref);
        let ext = file
            .extension()
            .map(str::to_string)
            .or_else(|| {
                source
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
            })
            .unwrap_or_default();
        let dest = dest_dir.join(format!("input{ext}"));

        tokio::fs::copy(&source, &dest).await.map_err(|e| {
            WorkerError::fetch_failed(format!("{}: {e}", source.display()))
        })?;
        Ok(dest)
    }
}

/// Transport that only logs. Used by the CLI, where there is no chat.
#[derive(Debug, Default)]
pub struct LogTransport {
    next_message: AtomicI64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn notify_turn(&self, chat_id: ChatId) -> NotifyResult<()> {
        info!(chat_id = %chat_id, "Your turn: processing has started, no need to resend");
        Ok(())
    }

    async fn notify_queue_update(
        &self,
        chat_id: ChatId,
        message: Option<MessageRef>,
        position: usize,
        eta_secs: u64,
    ) -> NotifyResult<Option<MessageRef>> {
        let message = message
            .unwrap_or_else(|| MessageRef(self.next_message.fetch_add(1, Ordering::Relaxed) + 1));
        info!(chat_id = %chat_id, message = message.0, position, eta_secs, "Queue position");
        Ok(Some(message))
    }

    async fn deliver_result(
        &self,
        chat_id: ChatId,
        kind: JobKind,
        outcome: &JobOutcome,
    ) -> NotifyResult<()> {
        match outcome.output() {
            Some(output) => info!(
                chat_id = %chat_id,
                kind = kind.as_str(),
                outcome = outcome.label(),
                output = %output.display(),
                "Result ready"
            ),
            None => info!(
                chat_id = %chat_id,
                kind = kind.as_str(),
                outcome = outcome.label(),
                "No result"
            ),
        }
        Ok(())
    }
}
