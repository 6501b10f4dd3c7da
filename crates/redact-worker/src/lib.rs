//! Redaction job worker.
//!
//! This crate provides:
//! - The job coordinator (one lock over admission, queue and cooldown state)
//! - The job executor that runs media pipelines per job kind
//! - Per-job workspaces removed on every exit path
//! - Transport and payload seams to the chat front end

pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod transport;
pub mod workspace;

pub use config::WorkerConfig;
pub use coordinator::JobCoordinator;
pub use error::{NotifyError, NotifyResult, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use transport::{LocalFileStore, LogTransport, PayloadStore, Transport};
pub use workspace::JobWorkspace;
