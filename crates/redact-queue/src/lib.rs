//! Admission control for redaction jobs.
//!
//! This crate provides:
//! - A concurrency-limited admission gate
//! - A FIFO wait queue with position and ETA estimates
//! - A post-completion cooldown gate with lazy expiry
//! - Synchronous size, duration and resolution limits
//!
//! Everything is plain state; [`Scheduler`] is meant to live behind one lock.

pub mod clock;
pub mod cooldown;
pub mod error;
pub mod limits;
pub mod scheduler;
pub mod wait_queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::CooldownGate;
pub use error::{QueueError, QueueResult, Rejection};
pub use limits::{EtaModel, SubmissionLimits};
pub use scheduler::{
    CancelEffect, FinishReport, JobTicket, Promotion, QueueUpdate, Scheduler, SchedulerConfig,
    Submission, SubmitDecision,
};
pub use wait_queue::{Enqueued, QueueEntry, WaitQueue};
