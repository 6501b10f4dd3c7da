//! Per-job scratch directory.

use redact_models::JobId;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::WorkerResult;

/// Directory owned by one job and removed when dropped.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create `work_dir/job-<id>-XXXX`, creating `work_dir` if needed.
    pub fn create(work_dir: &Path, job_id: &JobId) -> WorkerResult<Self> {
        std::fs::create_dir_all(work_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(work_dir)?;
        debug!(path = %dir.path().display(), "Created job workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Output path with the given extension (including the dot).
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.dir.path().join(format!("output{extension}"))
    }

    /// Remove the directory now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove job workspace");
        }
    }
}
