//! FIFO of users waiting for a slot.

use chrono::{DateTime, Utc};
use redact_models::{ChatId, FileDescriptor, JobKind, MessageRef, ModeMetadata, UserId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A user waiting for a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub enqueued_at: DateTime<Utc>,
    pub file: FileDescriptor,
    pub kind: JobKind,
    pub mode: ModeMetadata,
    /// Transport message showing this user's position, once sent
    pub queue_message: Option<MessageRef>,
}

/// Result of [`WaitQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended at this 1-indexed position
    Appended(usize),
    /// Existing entry updated in place at this position
    Refreshed(usize),
}

impl Enqueued {
    pub fn position(&self) -> usize {
        match self {
            Enqueued::Appended(p) | Enqueued::Refreshed(p) => *p,
        }
    }
}

/// Arrival-ordered queue holding at most one entry per user.
#[derive(Debug, Clone, Default)]
pub struct WaitQueue {
    entries: VecDeque<QueueEntry>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`, or refresh the user's existing entry without moving it.
    ///
    /// A refresh keeps the original `enqueued_at` and, unless the new entry
    /// carries one, the existing queue message.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Enqueued {
        if let Some(idx) = self.index_of(entry.user_id) {
            let existing = &mut self.entries[idx];
            existing.chat_id = entry.chat_id;
            existing.file = entry.file;
            existing.kind = entry.kind;
            existing.mode = entry.mode;
            if entry.queue_message.is_some() {
                existing.queue_message = entry.queue_message;
            }
            return Enqueued::Refreshed(idx + 1);
        }
        self.entries.push_back(entry);
        Enqueued::Appended(self.entries.len())
    }

    /// 1-indexed rank of `user`, if queued.
    pub fn position(&self, user: UserId) -> Option<usize> {
        self.index_of(user).map(|i| i + 1)
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.index_of(user).is_some()
    }

    /// Remove `user`'s entry wherever it is.
    pub fn withdraw(&mut self, user: UserId) -> Option<QueueEntry> {
        let idx = self.index_of(user)?;
        self.entries.remove(idx)
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn get_mut(&mut self, user: UserId) -> Option<&mut QueueEntry> {
        self.entries.iter_mut().find(|e| e.user_id == user)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_of(&self, user: UserId) -> Option<usize> {
        self.entries.iter().position(|e| e.user_id == user)
    }
}
