//! Scheduler status snapshots reported to the transport.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ChatId, JobId, JobKind, UserId};

/// A queued user's rank and estimated wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueuePosition {
    pub user_id: UserId,
    pub chat_id: ChatId,
    /// 1-indexed rank in the wait queue
    pub position: usize,
    /// Estimated seconds until the user's job starts
    pub eta_secs: u64,
}

/// A job currently holding an admission slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ActiveJobSummary {
    pub user_id: UserId,
    pub job_id: JobId,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of the admission state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServerStatus {
    pub active_jobs: usize,
    pub max_jobs: usize,
    pub queue_length: usize,
    pub is_busy: bool,
    /// Cooldown entries not yet lazily cleared (may include expired ones)
    pub cooldowns_active: usize,
    pub active: Vec<ActiveJobSummary>,
    pub queue: Vec<QueuePosition>,
}
