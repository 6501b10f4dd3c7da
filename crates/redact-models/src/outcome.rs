//! Terminal job outcomes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Pipeline is running
    #[default]
    Running,
    /// Finished and produced output
    Completed,
    /// Aborted by the user
    Cancelled,
    /// Aborted by a fatal error
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Result of running one job's pipeline.
///
/// Fallbacks are explicit variants rather than swallowed errors:
/// `SuccessDegraded` means the output exists but an optional step
/// (audio re-mux) did not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Output produced with every step applied
    Success { output: PathBuf },
    /// Output produced, but an optional step fell back
    SuccessDegraded { output: PathBuf, reason: String },
    /// User cancelled; no output exists
    Cancelled,
    /// Fatal error; no output exists
    Failed { reason: String },
}

impl JobOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether the user receives an artifact (and therefore a cooldown).
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. } | JobOutcome::SuccessDegraded { .. })
    }

    /// Path of the produced artifact, if any.
    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            JobOutcome::Success { output } | JobOutcome::SuccessDegraded { output, .. } => {
                Some(output)
            }
            JobOutcome::Cancelled | JobOutcome::Failed { .. } => None,
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Success { .. } | JobOutcome::SuccessDegraded { .. } => JobState::Completed,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Success { .. } => "success",
            JobOutcome::SuccessDegraded { .. } => "success_degraded",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}
