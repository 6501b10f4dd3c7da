//! Admission gate, wait queue and cooldown combined behind one owner.
//!
//! [`Scheduler`] is plain state with no locking of its own. Callers wrap it
//! in a single mutex so each operation (admit, enqueue, promote, cooldown)
//! is atomic with respect to the others.

use chrono::{DateTime, Duration, Utc};
use redact_models::{
    ActiveJobSummary, ChatId, FileDescriptor, JobId, JobKind, MessageRef, ModeMetadata,
    QueuePosition, ServerStatus, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::cooldown::CooldownGate;
use crate::error::{QueueError, QueueResult, Rejection};
use crate::limits::{EtaModel, SubmissionLimits};
use crate::wait_queue::{Enqueued, QueueEntry, WaitQueue};

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrency ceiling for active jobs
    pub max_concurrent_jobs: usize,
    /// Cooldown after a successful job, in seconds
    pub cooldown_secs: u64,
    pub limits: SubmissionLimits,
    pub eta: EtaModel,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            cooldown_secs: 30,
            limits: SubmissionLimits::default(),
            eta: EtaModel::default(),
        }
    }
}

/// A user's request to process one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: JobKind,
    pub file: FileDescriptor,
    pub mode: ModeMetadata,
}

/// An admitted job. The holder owns the slot until it calls
/// [`Scheduler::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobTicket {
    pub job_id: JobId,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: JobKind,
    pub file: FileDescriptor,
    pub mode: ModeMetadata,
    pub started_at: DateTime<Utc>,
    /// Estimated processing time in seconds
    pub estimated_secs: u64,
}

/// Outcome of [`Scheduler::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitDecision {
    Admitted(JobTicket),
    Queued {
        position: usize,
        eta_secs: u64,
        /// The user was already queued and kept their rank
        refreshed: bool,
    },
    Rejected(Rejection),
}

/// New position and ETA for a queued user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUpdate {
    pub position: QueuePosition,
    pub queue_message: Option<MessageRef>,
}

/// A queued user moved into a free slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub ticket: JobTicket,
    pub queue_message: Option<MessageRef>,
}

/// What changed when a job finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishReport {
    pub promotions: Vec<Promotion>,
    /// Positions of users still waiting after promotions
    pub queue_updates: Vec<QueueUpdate>,
}

/// Outcome of [`Scheduler::request_cancel`].
#[derive(Debug, Clone, PartialEq)]
pub enum CancelEffect {
    /// The user had nothing queued or running
    Nothing,
    /// The user was removed from the wait queue
    Withdrawn {
        entry: QueueEntry,
        queue_updates: Vec<QueueUpdate>,
    },
    /// The user's running job should observe its cancel token
    SignalActive { job_id: JobId },
}

#[derive(Debug, Clone)]
struct ActiveJob {
    job_id: JobId,
    kind: JobKind,
    started_at: DateTime<Utc>,
}

/// Process-wide admission state.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    active: HashMap<UserId, ActiveJob>,
    queue: WaitQueue,
    cooldowns: CooldownGate,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let cooldown = Duration::seconds(config.cooldown_secs.min(i64::MAX as u64) as i64);
        Self {
            config,
            clock,
            active: HashMap::new(),
            queue: WaitQueue::new(),
            cooldowns: CooldownGate::new(cooldown),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.active.len() >= self.config.max_concurrent_jobs
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_job(&self, user: UserId) -> Option<&JobId> {
        self.active.get(&user).map(|a| &a.job_id)
    }

    pub fn is_queued(&self, user: UserId) -> bool {
        self.queue.contains(user)
    }

    /// Estimated processing seconds for a payload.
    pub fn estimate_secs(&self, kind: JobKind, file: &FileDescriptor) -> u64 {
        self.config.eta.job_secs(kind, file.size_mb()) as u64
    }

    /// Validate, then admit, queue or reject.
    pub fn submit(&mut self, submission: Submission) -> SubmitDecision {
        let user = submission.user_id;

        if let Err(rejection) = self
            .config
            .limits
            .validate(submission.kind, &submission.file)
        {
            info!(user_id = %user, reason = rejection.label(), "Submission rejected");
            return SubmitDecision::Rejected(rejection);
        }

        if self.active.contains_key(&user) {
            return SubmitDecision::Rejected(Rejection::AlreadyProcessing);
        }

        let now = self.clock.now();
        if self.cooldowns.is_on_cooldown(user, now) {
            let remaining_secs = self.cooldowns.remaining_secs(user, now);
            return SubmitDecision::Rejected(Rejection::OnCooldown { remaining_secs });
        }

        if !self.queue.contains(user) && !self.is_busy() {
            let ticket = self.admit(
                user,
                submission.chat_id,
                submission.kind,
                submission.file,
                submission.mode,
            );
            return SubmitDecision::Admitted(ticket);
        }

        let kind = submission.kind;
        let job_secs = self.config.eta.job_secs(kind, submission.file.size_mb());
        let enqueued = self.queue.enqueue(QueueEntry {
            user_id: user,
            chat_id: submission.chat_id,
            enqueued_at: now,
            file: submission.file,
            kind,
            mode: submission.mode,
            queue_message: None,
        });

        let position = enqueued.position();
        let eta_secs = self.config.eta.eta_secs(self.active.len(), position, job_secs);
        info!(user_id = %user, position, eta_secs, "User queued");

        SubmitDecision::Queued {
            position,
            eta_secs,
            refreshed: matches!(enqueued, Enqueued::Refreshed(_)),
        }
    }

    /// Remember which transport message shows `user`'s position.
    pub fn set_queue_message(&mut self, user: UserId, message: MessageRef) -> QueueResult<()> {
        let entry = self.queue.get_mut(user).ok_or(QueueError::NotQueued(user))?;
        entry.queue_message = Some(message);
        Ok(())
    }

    /// Current position and ETA for one queued user.
    pub fn queue_position(&self, user: UserId) -> Option<QueuePosition> {
        self.queue_updates()
            .into_iter()
            .map(|u| u.position)
            .find(|p| p.user_id == user)
    }

    /// Positions and ETAs for everyone waiting, in queue order.
    pub fn queue_updates(&self) -> Vec<QueueUpdate> {
        let active = self.active.len();
        self.queue
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let position = idx + 1;
                let job_secs = self.config.eta.job_secs(entry.kind, entry.file.size_mb());
                QueueUpdate {
                    position: QueuePosition {
                        user_id: entry.user_id,
                        chat_id: entry.chat_id,
                        position,
                        eta_secs: self.config.eta.eta_secs(active, position, job_secs),
                    },
                    queue_message: entry.queue_message,
                }
            })
            .collect()
    }

    /// Withdraw a queued user, or report the job to signal if one is running.
    pub fn request_cancel(&mut self, user: UserId) -> CancelEffect {
        if let Some(active) = self.active.get(&user) {
            info!(user_id = %user, job_id = %active.job_id, "Cancellation requested");
            return CancelEffect::SignalActive {
                job_id: active.job_id.clone(),
            };
        }

        match self.queue.withdraw(user) {
            Some(entry) => {
                info!(user_id = %user, "User withdrew from queue");
                CancelEffect::Withdrawn {
                    entry,
                    queue_updates: self.queue_updates(),
                }
            }
            None => CancelEffect::Nothing,
        }
    }

    /// Drop a queued user the transport can no longer reach.
    ///
    /// Returns the refreshed positions of everyone behind them, or `None` if
    /// the user was not queued.
    pub fn evict(&mut self, user: UserId) -> Option<Vec<QueueUpdate>> {
        self.queue.withdraw(user)?;
        info!(user_id = %user, "Evicted unreachable user from queue");
        Some(self.queue_updates())
    }

    /// Release `user`'s slot and promote waiting users into free slots.
    ///
    /// A successful job starts the user's cooldown.
    pub fn finish(
        &mut self,
        user: UserId,
        job_id: &JobId,
        succeeded: bool,
    ) -> QueueResult<FinishReport> {
        match self.active.get(&user) {
            None => return Err(QueueError::NotActive(user)),
            Some(active) if &active.job_id != job_id => {
                return Err(QueueError::JobMismatch {
                    user_id: user,
                    job_id: job_id.clone(),
                })
            }
            Some(_) => {}
        }
        self.active.remove(&user);

        let now = self.clock.now();
        if succeeded {
            self.cooldowns.start(user, now);
        }

        let mut promotions = Vec::new();
        while !self.is_busy() {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            let queue_message = entry.queue_message;
            let ticket = self.admit(
                entry.user_id,
                entry.chat_id,
                entry.kind,
                entry.file,
                entry.mode,
            );
            debug!(user_id = %ticket.user_id, job_id = %ticket.job_id, "Promoted from queue");
            promotions.push(Promotion {
                ticket,
                queue_message,
            });
        }

        Ok(FinishReport {
            promotions,
            queue_updates: self.queue_updates(),
        })
    }

    pub fn is_on_cooldown(&mut self, user: UserId) -> bool {
        let now = self.clock.now();
        self.cooldowns.is_on_cooldown(user, now)
    }

    /// Seconds of cooldown left for `user`, 0 when none.
    pub fn cooldown_remaining(&mut self, user: UserId) -> u64 {
        let now = self.clock.now();
        self.cooldowns.remaining_secs(user, now)
    }

    /// Administrative cooldown reset.
    pub fn clear_cooldown(&mut self, user: UserId) -> bool {
        self.cooldowns.clear(user)
    }

    pub fn status(&self) -> ServerStatus {
        let mut active: Vec<ActiveJobSummary> = self
            .active
            .iter()
            .map(|(user, job)| ActiveJobSummary {
                user_id: *user,
                job_id: job.job_id.clone(),
                kind: job.kind,
                started_at: job.started_at,
            })
            .collect();
        active.sort_by_key(|a| (a.started_at, a.user_id));

        ServerStatus {
            active_jobs: self.active.len(),
            max_jobs: self.config.max_concurrent_jobs,
            queue_length: self.queue.len(),
            is_busy: self.is_busy(),
            cooldowns_active: self.cooldowns.len(),
            active,
            queue: self.queue_updates().into_iter().map(|u| u.position).collect(),
        }
    }

    fn admit(
        &mut self,
        user: UserId,
        chat_id: ChatId,
        kind: JobKind,
        file: FileDescriptor,
        mode: ModeMetadata,
    ) -> JobTicket {
        let job_id = JobId::new();
        let started_at = self.clock.now();
        let estimated_secs = self.estimate_secs(kind, &file);

        self.active.insert(
            user,
            ActiveJob {
                job_id: job_id.clone(),
                kind,
                started_at,
            },
        );
        info!(
            user_id = %user,
            job_id = %job_id,
            kind = kind.as_str(),
            active = self.active.len(),
            "Job admitted"
        );

        JobTicket {
            job_id,
            user_id: user,
            chat_id,
            kind,
            file,
            mode,
            started_at,
            estimated_secs,
        }
    }
}
