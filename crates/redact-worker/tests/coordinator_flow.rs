//! Coordinator scenarios with an in-memory transport and payload store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use redact_media::{DetectorFactory, FaceDetector, MediaResult};
use redact_models::{
    BoundingBox, ChatId, FileDescriptor, JobKind, JobOutcome, MessageRef, ModeMetadata, UserId,
};
use redact_queue::{CancelEffect, Rejection, Scheduler, Submission, SubmitDecision};
use redact_worker::control::{self, ControlCommand, ControlReply};
use redact_worker::{
    JobCoordinator, JobExecutor, LocalFileStore, NotifyError, NotifyResult, PayloadStore,
    Transport, WorkerConfig, WorkerResult,
};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Turn(ChatId),
    Position(ChatId, usize, u64),
    Delivered(ChatId, &'static str),
}

#[derive(Default)]
struct RecordingTransport {
    events: Mutex<Vec<Event>>,
    unreachable_turn: HashSet<ChatId>,
    unreachable_update: HashSet<ChatId>,
}

impl RecordingTransport {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn notify_turn(&self, chat_id: ChatId) -> NotifyResult<()> {
        if self.unreachable_turn.contains(&chat_id) {
            return Err(NotifyError::unreachable("blocked"));
        }
        self.push(Event::Turn(chat_id));
        Ok(())
    }

    async fn notify_queue_update(
        &self,
        chat_id: ChatId,
        message: Option<MessageRef>,
        position: usize,
        eta_secs: u64,
    ) -> NotifyResult<Option<MessageRef>> {
        if self.unreachable_update.contains(&chat_id) {
            return Err(NotifyError::unreachable("chat deleted"));
        }
        self.push(Event::Position(chat_id, position, eta_secs));
        Ok(message.or(Some(MessageRef(chat_id.0))))
    }

    async fn deliver_result(
        &self,
        chat_id: ChatId,
        _kind: JobKind,
        outcome: &JobOutcome,
    ) -> NotifyResult<()> {
        self.push(Event::Delivered(chat_id, outcome.label()));
        Ok(())
    }
}

/// Writes a small PNG per fetch, one fetch per released permit.
struct GatedStore {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl PayloadStore for GatedStore {
    async fn fetch(&self, _file: &FileDescriptor, dest_dir: &Path) -> WorkerResult<PathBuf> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        let dest = dest_dir.join("input.png");
        let path = dest.clone();
        tokio::task::spawn_blocking(move || {
            RgbImage::from_fn(64, 64, |x, y| image::Rgb([x as u8 * 4, y as u8 * 4, 128]))
                .save(&path)
        })
        .await
        .unwrap()
        .map_err(|e| redact_worker::WorkerError::fetch_failed(e.to_string()))?;
        Ok(dest)
    }
}

struct NoFaces;

struct EmptyDetector;

impl FaceDetector for EmptyDetector {
    fn detect(&mut self, _frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        Ok(Vec::new())
    }
}

impl DetectorFactory for NoFaces {
    fn create(&self, _w: u32, _h: u32) -> MediaResult<Box<dyn FaceDetector>> {
        Ok(Box::new(EmptyDetector))
    }
}

struct Harness {
    coordinator: JobCoordinator,
    transport: Arc<RecordingTransport>,
    gate: Arc<Semaphore>,
    work_dir: PathBuf,
    _root: tempfile::TempDir,
}

fn harness(transport: RecordingTransport) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let work_dir = root.path().join("jobs");
    let config = WorkerConfig {
        work_dir: work_dir.clone(),
        ..WorkerConfig::default()
    };

    let transport = Arc::new(transport);
    let gate = Arc::new(Semaphore::new(0));
    let executor = JobExecutor::new(
        &config,
        Arc::new(NoFaces),
        Arc::new(GatedStore { gate: gate.clone() }),
        transport.clone(),
    );
    let coordinator = JobCoordinator::new(
        Scheduler::new(config.scheduler_config()),
        executor,
        transport.clone(),
    );

    Harness {
        coordinator,
        transport,
        gate,
        work_dir,
        _root: root,
    }
}

fn image_job(user: i64) -> Submission {
    Submission {
        user_id: UserId(user),
        chat_id: ChatId(user),
        kind: JobKind::Image,
        file: FileDescriptor::new("face.png", 1024)
            .with_file_name("face.png")
            .with_dimensions(64, 64),
        mode: ModeMetadata::default(),
    }
}

async fn settle(coordinator: &JobCoordinator) {
    tokio::time::timeout(Duration::from_secs(10), coordinator.wait_idle())
        .await
        .expect("jobs did not finish");
}

fn workspace_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_third_submission_queued_then_promoted() {
    let h = harness(RecordingTransport::default());

    assert!(matches!(
        h.coordinator.submit(image_job(1)).await,
        SubmitDecision::Admitted(_)
    ));
    assert!(matches!(
        h.coordinator.submit(image_job(2)).await,
        SubmitDecision::Admitted(_)
    ));
    // T is the 2 s image floor; two running jobs put position 1 at T.
    assert_eq!(
        h.coordinator.submit(image_job(3)).await,
        SubmitDecision::Queued {
            position: 1,
            eta_secs: 2,
            refreshed: false
        }
    );

    h.gate.add_permits(3);
    settle(&h.coordinator).await;

    let events = h.transport.events();
    assert!(events.contains(&Event::Position(ChatId(3), 1, 2)));
    assert!(events.contains(&Event::Turn(ChatId(3))));
    for chat in 1..=3 {
        assert!(events.contains(&Event::Delivered(ChatId(chat), "success")));
    }

    let status = h.coordinator.status().await;
    assert_eq!(status.active_jobs, 0);
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.cooldowns_active, 3);
    assert_eq!(workspace_entries(&h.work_dir), 0);
}

#[tokio::test]
async fn test_cooldown_blocks_resubmission() {
    let h = harness(RecordingTransport::default());
    h.gate.add_permits(1);
    h.coordinator.submit(image_job(1)).await;
    settle(&h.coordinator).await;

    match h.coordinator.submit(image_job(1)).await {
        SubmitDecision::Rejected(Rejection::OnCooldown { remaining_secs }) => {
            assert!(remaining_secs > 0 && remaining_secs <= 30);
        }
        other => panic!("expected cooldown rejection, got {other:?}"),
    }

    assert!(h.coordinator.clear_cooldown(UserId(1)).await);
    assert!(matches!(
        h.coordinator.submit(image_job(1)).await,
        SubmitDecision::Admitted(_)
    ));
    h.gate.add_permits(1);
    settle(&h.coordinator).await;
}

#[tokio::test]
async fn test_cancel_active_job_removes_workspace() {
    let h = harness(RecordingTransport::default());
    let SubmitDecision::Admitted(ticket) = h.coordinator.submit(image_job(1)).await else {
        panic!("expected admission");
    };

    assert_eq!(
        h.coordinator.request_cancel(UserId(1)).await,
        CancelEffect::SignalActive {
            job_id: ticket.job_id
        }
    );
    settle(&h.coordinator).await;

    assert_eq!(
        h.transport.events(),
        vec![Event::Delivered(ChatId(1), "cancelled")]
    );
    assert_eq!(workspace_entries(&h.work_dir), 0);
    assert_eq!(h.coordinator.cooldown_remaining(UserId(1)).await, 0);
}

#[tokio::test]
async fn test_withdrawn_user_is_never_promoted() {
    let h = harness(RecordingTransport::default());
    h.coordinator.submit(image_job(1)).await;
    h.coordinator.submit(image_job(2)).await;
    h.coordinator.submit(image_job(3)).await;
    h.coordinator.submit(image_job(4)).await;

    assert!(matches!(
        h.coordinator.request_cancel(UserId(3)).await,
        CancelEffect::Withdrawn { .. }
    ));
    let position = h.coordinator.queue_position(UserId(4)).await.unwrap();
    assert_eq!(position.position, 1);

    h.gate.add_permits(3);
    settle(&h.coordinator).await;

    let events = h.transport.events();
    assert!(events.contains(&Event::Position(ChatId(4), 1, 2)));
    assert!(events.contains(&Event::Turn(ChatId(4))));
    assert!(!events.contains(&Event::Turn(ChatId(3))));
    assert!(!events.iter().any(|e| matches!(e, Event::Delivered(ChatId(3), _))));
}

#[tokio::test]
async fn test_unreachable_promoted_user_gives_slot_to_next() {
    let h = harness(RecordingTransport {
        unreachable_turn: HashSet::from([ChatId(3)]),
        ..RecordingTransport::default()
    });
    h.coordinator.submit(image_job(1)).await;
    h.coordinator.submit(image_job(2)).await;
    h.coordinator.submit(image_job(3)).await;
    h.coordinator.submit(image_job(4)).await;

    h.gate.add_permits(3);
    settle(&h.coordinator).await;

    let events = h.transport.events();
    assert!(events.contains(&Event::Turn(ChatId(4))));
    assert!(events.contains(&Event::Delivered(ChatId(4), "success")));
    assert!(!events.iter().any(|e| matches!(e, Event::Delivered(ChatId(3), _))));

    let status = h.coordinator.status().await;
    assert_eq!(status.queue_length, 0);
    // Only the three completed jobs start a cooldown.
    assert_eq!(status.cooldowns_active, 3);
}

#[tokio::test]
async fn test_unreachable_queued_user_is_evicted() {
    let h = harness(RecordingTransport {
        unreachable_update: HashSet::from([ChatId(3)]),
        ..RecordingTransport::default()
    });
    h.coordinator.submit(image_job(1)).await;
    h.coordinator.submit(image_job(2)).await;
    h.coordinator.submit(image_job(3)).await;

    assert_eq!(h.coordinator.status().await.queue_length, 0);
    assert_eq!(
        h.coordinator.submit(image_job(4)).await,
        SubmitDecision::Queued {
            position: 1,
            eta_secs: 2,
            refreshed: false
        }
    );

    h.gate.add_permits(3);
    settle(&h.coordinator).await;
}

#[tokio::test]
async fn test_rejections_leave_no_state() {
    let h = harness(RecordingTransport::default());

    let mut too_big = image_job(1);
    too_big.file.size_bytes = 50 * 1024 * 1024;
    assert!(matches!(
        h.coordinator.submit(too_big).await,
        SubmitDecision::Rejected(Rejection::FileTooLarge { .. })
    ));

    h.coordinator.submit(image_job(2)).await;
    assert_eq!(
        h.coordinator.submit(image_job(2)).await,
        SubmitDecision::Rejected(Rejection::AlreadyProcessing)
    );

    let status = h.coordinator.status().await;
    assert_eq!(status.active_jobs, 1);
    assert_eq!(status.queue_length, 0);

    h.gate.add_permits(1);
    settle(&h.coordinator).await;
}

#[tokio::test]
async fn test_shutdown_cancels_running_jobs() {
    let h = harness(RecordingTransport::default());
    h.coordinator.submit(image_job(1)).await;
    h.coordinator.submit(image_job(2)).await;

    assert!(h.coordinator.shutdown(Duration::from_secs(10)).await);

    let events = h.transport.events();
    assert!(events.contains(&Event::Delivered(ChatId(1), "cancelled")));
    assert!(events.contains(&Event::Delivered(ChatId(2), "cancelled")));
    assert_eq!(workspace_entries(&h.work_dir), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_respect_ceiling() {
    let h = harness(RecordingTransport::default());

    let submits: Vec<_> = (1..=32)
        .map(|user| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.submit(image_job(user)).await })
        })
        .collect();

    let mut admitted = 0;
    let mut positions = Vec::new();
    for submit in submits {
        match submit.await.unwrap() {
            SubmitDecision::Admitted(_) => admitted += 1,
            SubmitDecision::Queued { position, .. } => positions.push(position),
            SubmitDecision::Rejected(rejection) => panic!("unexpected rejection: {rejection}"),
        }
    }

    assert_eq!(admitted, 2);
    let status = h.coordinator.status().await;
    assert_eq!(status.active_jobs, 2);
    assert_eq!(status.queue_length, 30);
    let ranks: Vec<usize> = status.queue.iter().map(|q| q.position).collect();
    assert_eq!(ranks, (1..=30).collect::<Vec<_>>());
    assert_eq!(positions.len(), 30);

    h.gate.add_permits(32);
    tokio::time::timeout(Duration::from_secs(30), h.coordinator.wait_idle())
        .await
        .expect("jobs did not finish");

    let delivered = h
        .transport
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Delivered(_, "success")))
        .count();
    assert_eq!(delivered, 32);
    assert_eq!(h.coordinator.status().await.queue_length, 0);
}

#[tokio::test]
async fn test_control_submit_resolves_relative_path_under_payload_root() {
    let root = tempfile::tempdir().unwrap();
    let payloads = root.path().join("payloads");
    std::fs::create_dir_all(&payloads).unwrap();
    RgbImage::from_fn(48, 32, |x, y| image::Rgb([x as u8 * 5, y as u8 * 7, 64]))
        .save(payloads.join("pic.png"))
        .unwrap();

    let config = WorkerConfig {
        work_dir: root.path().join("jobs"),
        ..WorkerConfig::default()
    };
    let transport = Arc::new(RecordingTransport::default());
    let store = Arc::new(LocalFileStore::new(&payloads));
    let executor = JobExecutor::new(&config, Arc::new(NoFaces), store.clone(), transport.clone());
    let coordinator = JobCoordinator::new(
        Scheduler::new(config.scheduler_config()),
        executor,
        transport.clone(),
    );

    let command = control::parse_line(r#"{"op":"submit","user_id":7,"path":"pic.png"}"#).unwrap();
    assert!(matches!(command, ControlCommand::Submit { .. }));
    let reply = control::handle(&coordinator, &store, command).await;
    assert!(
        matches!(reply, ControlReply::Admitted { .. }),
        "unexpected reply {reply:?}"
    );

    settle(&coordinator).await;
    assert_eq!(
        transport.events(),
        vec![Event::Delivered(ChatId(7), "success")]
    );
}
