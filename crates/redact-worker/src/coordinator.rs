//! Control plane: admission, promotion, cancellation and notifications.
//!
//! All scheduling state sits behind one mutex. Jobs run on their own tasks
//! and report back through [`JobCoordinator::complete`], which frees the
//! slot and promotes the head of the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use redact_models::{JobOutcome, QueuePosition, ServerStatus, UserId};
use redact_queue::{
    CancelEffect, FinishReport, JobTicket, Promotion, QueueUpdate, Scheduler, Submission,
    SubmitDecision,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::executor::JobExecutor;
use crate::metrics;
use crate::transport::Transport;

struct CoordinatorState {
    scheduler: Scheduler,
    cancels: HashMap<UserId, CancellationToken>,
}

impl CoordinatorState {
    fn register(&mut self, ticket: &JobTicket, shutdown: &CancellationToken) -> CancellationToken {
        let token = shutdown.child_token();
        self.cancels.insert(ticket.user_id, token.clone());
        token
    }

    fn record_occupancy(&self) {
        metrics::set_occupancy(self.scheduler.active_count(), self.scheduler.queue_len());
    }
}

struct Inner {
    state: Mutex<CoordinatorState>,
    executor: JobExecutor,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
}

/// Shared handle to the control plane.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

impl JobCoordinator {
    pub fn new(scheduler: Scheduler, executor: JobExecutor, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState {
                    scheduler,
                    cancels: HashMap::new(),
                }),
                executor,
                transport,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Admit, queue or reject a submission. Admitted jobs start immediately.
    pub async fn submit(&self, submission: Submission) -> SubmitDecision {
        let user = submission.user_id;

        let (decision, started, update) = {
            let mut state = self.inner.state.lock().await;
            let decision = state.scheduler.submit(submission);
            let started = match &decision {
                SubmitDecision::Admitted(ticket) => {
                    Some(state.register(ticket, &self.inner.shutdown))
                }
                _ => None,
            };
            let update = match &decision {
                SubmitDecision::Queued { .. } => state
                    .scheduler
                    .queue_updates()
                    .into_iter()
                    .find(|u| u.position.user_id == user),
                _ => None,
            };
            state.record_occupancy();
            (decision, started, update)
        };

        match &decision {
            SubmitDecision::Admitted(ticket) => {
                metrics::record_submission("admitted");
                if let Some(token) = started {
                    self.spawn_job(ticket.clone(), token);
                }
            }
            SubmitDecision::Queued { .. } => {
                metrics::record_submission("queued");
                if let Some(update) = update {
                    self.publish_queue_updates(vec![update]).await;
                }
            }
            SubmitDecision::Rejected(rejection) => {
                metrics::record_submission(rejection.label());
            }
        }

        decision
    }

    /// Withdraw a queued user or signal a running job.
    pub async fn request_cancel(&self, user: UserId) -> CancelEffect {
        let effect = {
            let mut state = self.inner.state.lock().await;
            let effect = state.scheduler.request_cancel(user);
            if let CancelEffect::SignalActive { .. } = &effect {
                if let Some(token) = state.cancels.get(&user) {
                    token.cancel();
                }
            }
            state.record_occupancy();
            effect
        };

        if let CancelEffect::Withdrawn { queue_updates, .. } = &effect {
            self.publish_queue_updates(queue_updates.clone()).await;
        }
        effect
    }

    pub async fn status(&self) -> ServerStatus {
        self.inner.state.lock().await.scheduler.status()
    }

    pub async fn queue_position(&self, user: UserId) -> Option<QueuePosition> {
        self.inner.state.lock().await.scheduler.queue_position(user)
    }

    pub async fn cooldown_remaining(&self, user: UserId) -> u64 {
        self.inner.state.lock().await.scheduler.cooldown_remaining(user)
    }

    pub async fn clear_cooldown(&self, user: UserId) -> bool {
        self.inner.state.lock().await.scheduler.clear_cooldown(user)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.state.lock().await.scheduler.active_count()
    }

    /// Wait until no job holds a slot.
    pub async fn wait_idle(&self) {
        while self.active_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Cancel every running job and wait for them to report back.
    ///
    /// Returns `false` if jobs were still running when `timeout` elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!("Shutting down coordinator");
        self.inner.shutdown.cancel();
        let drained = tokio::time::timeout(timeout, self.wait_idle()).await.is_ok();
        self.inner.executor.close();
        if !drained {
            warn!("Jobs still running after shutdown timeout");
        }
        drained
    }

    fn spawn_job(&self, ticket: JobTicket, cancel: CancellationToken) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let outcome = coordinator.inner.executor.execute(&ticket, &cancel).await;
            coordinator.complete(ticket, outcome).await;
        });
    }

    /// Free the job's slot, start cooldown on success, promote waiting users.
    async fn complete(&self, ticket: JobTicket, outcome: JobOutcome) {
        metrics::record_job_finished(ticket.kind.as_str(), outcome.label());

        let promotions = {
            let mut state = self.inner.state.lock().await;
            state.cancels.remove(&ticket.user_id);
            let report =
                state
                    .scheduler
                    .finish(ticket.user_id, &ticket.job_id, outcome.is_success());
            let promotions = match report {
                Ok(report) => self.register_promotions(&mut state, report),
                Err(e) => {
                    warn!(job_id = %ticket.job_id, error = %e, "Finished job was not active");
                    return;
                }
            };
            state.record_occupancy();
            promotions
        };

        info!(
            user_id = %ticket.user_id,
            job_id = %ticket.job_id,
            outcome = outcome.label(),
            "Job finished"
        );
        self.start_promotions(promotions).await;
    }

    fn register_promotions(
        &self,
        state: &mut CoordinatorState,
        report: FinishReport,
    ) -> PendingPromotions {
        let starts = report
            .promotions
            .into_iter()
            .map(|promotion| {
                let token = state.register(&promotion.ticket, &self.inner.shutdown);
                (promotion, token)
            })
            .collect();
        PendingPromotions {
            starts,
            queue_updates: report.queue_updates,
        }
    }

    /// Notify each promoted user, then start their job. A user the
    /// transport cannot reach gives the slot to the next in line.
    async fn start_promotions(&self, mut pending: PendingPromotions) {
        while let Some((promotion, token)) = pending.starts.pop_front() {
            let Promotion { ticket, .. } = promotion;

            match self.inner.transport.notify_turn(ticket.chat_id).await {
                Ok(()) => {}
                Err(NotifyError::Unreachable(reason)) => {
                    warn!(
                        user_id = %ticket.user_id,
                        reason = %reason,
                        "Promoted user unreachable, releasing slot"
                    );
                    metrics::record_eviction();

                    let mut state = self.inner.state.lock().await;
                    state.cancels.remove(&ticket.user_id);
                    match state.scheduler.finish(ticket.user_id, &ticket.job_id, false) {
                        Ok(report) => {
                            let next = self.register_promotions(&mut state, report);
                            pending.starts.extend(next.starts);
                            pending.queue_updates = next.queue_updates;
                        }
                        Err(e) => debug!(error = %e, "Promotion already released"),
                    }
                    state.record_occupancy();
                    continue;
                }
                Err(e) => {
                    warn!(user_id = %ticket.user_id, error = %e, "Turn notification failed");
                }
            }

            self.spawn_job(ticket, token);
        }

        self.publish_queue_updates(pending.queue_updates).await;
    }

    /// Send positions and ETAs to queued users, evicting the unreachable.
    async fn publish_queue_updates(&self, updates: Vec<QueueUpdate>) {
        let mut pending: VecDeque<QueueUpdate> = updates.into();

        while let Some(QueueUpdate {
            position,
            queue_message,
        }) = pending.pop_front()
        {
            let sent = self
                .inner
                .transport
                .notify_queue_update(
                    position.chat_id,
                    queue_message,
                    position.position,
                    position.eta_secs,
                )
                .await;

            match sent {
                Ok(Some(message)) if Some(message) != queue_message => {
                    let mut state = self.inner.state.lock().await;
                    if let Err(e) = state.scheduler.set_queue_message(position.user_id, message) {
                        debug!(error = %e, "User left the queue before the update was sent");
                    }
                }
                Ok(_) => {}
                Err(NotifyError::Unreachable(reason)) => {
                    let mut state = self.inner.state.lock().await;
                    if let Some(rest) = state.scheduler.evict(position.user_id) {
                        warn!(user_id = %position.user_id, reason = %reason, "Evicted unreachable user");
                        metrics::record_eviction();
                        state.record_occupancy();
                        pending = rest
                            .into_iter()
                            .filter(|u| u.position.position >= position.position)
                            .collect();
                    }
                }
                Err(e) => {
                    warn!(user_id = %position.user_id, error = %e, "Queue update failed");
                }
            }
        }
    }
}

struct PendingPromotions {
    starts: VecDeque<(Promotion, CancellationToken)>,
    queue_updates: Vec<QueueUpdate>,
}
