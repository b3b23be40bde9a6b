//! Pipeline stage trait definition.
//!
//! A stage is a command template plus an output interpreter. The pipeline
//! owns process execution; stages only describe what to run and what to do
//! around it.

use std::path::Path;

use crate::models::Job;
use crate::process::{Invocation, OutputInterpreter};

use super::errors::{StageError, StageResult};
use super::types::{Context, StageKind};

/// Trait for pipeline stages.
///
/// The pipeline calls these methods in order:
///
/// 1. `validate_input` - check that the stage's input exists
/// 2. `prepare` - remove stale output from an earlier run
/// 3. `invocation` - build the command (run by the pipeline)
/// 4. `on_success` - verify output, remove consumed intermediates
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Check preconditions before anything is touched.
    fn validate_input(&self, job: &Job, ctx: &Context) -> StageResult<()>;

    /// File this stage produces.
    fn output_path<'a>(&self, job: &'a Job) -> &'a Path;

    /// Delete any pre-existing output so a restart is idempotent.
    fn prepare(&self, job: &Job) -> StageResult<()> {
        remove_if_exists(self.output_path(job))
    }

    /// Command to run for `job`.
    fn invocation(&self, job: &Job, ctx: &Context) -> Invocation;

    /// Output interpreter for this stage's tool.
    fn interpreter(&self, ctx: &Context) -> OutputInterpreter;

    /// Called after a clean exit.
    fn on_success(&self, job: &Job, _ctx: &Context) -> StageResult<()> {
        require_output(self.output_path(job), self.name())
    }
}

/// Remove `path` if present. A missing file is not an error.
pub fn remove_if_exists(path: &Path) -> StageResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StageError::io(format!("removing {}", path.display()), e)),
    }
}

/// Fail with `MissingOutput` unless `path` is a file.
pub fn require_output(path: &Path, tool: &str) -> StageResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StageError::MissingOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn remove_if_exists_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_demux.aac");
        assert!(remove_if_exists(&path).is_ok());

        std::fs::write(&path, b"raw").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn require_output_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_temp.m4b");
        let err = require_output(&path, "Remux").unwrap_err();
        assert!(err.to_string().contains("x_temp.m4b"));

        std::fs::write(&path, b"box").unwrap();
        assert!(require_output(&path, "Remux").is_ok());
    }
}
