//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Job → Stage → Tool → Detail

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{ErrorKind, JobError};

/// Top-level pipeline error with job context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed.
    #[error("Job '{job_name}' failed at stage '{stage_name}': {source}")]
    StageFailed {
        job_name: String,
        stage_name: String,
        #[source]
        source: StageError,
    },

    /// The job was cancelled.
    #[error("Job '{job_name}' was cancelled")]
    Cancelled { job_name: String },

    /// The queue task itself died.
    #[error("Queue aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn stage_failed(
        job_name: impl Into<String>,
        stage_name: impl Into<String>,
        source: StageError,
    ) -> Self {
        Self::StageFailed {
            job_name: job_name.into(),
            stage_name: stage_name.into(),
            source,
        }
    }

    pub fn cancelled(job_name: impl Into<String>) -> Self {
        Self::Cancelled {
            job_name: job_name.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::StageFailed { source, .. } => source.kind(),
            PipelineError::Cancelled { .. } => ErrorKind::Interrupted,
            PipelineError::Aborted(_) => ErrorKind::SpawnFailure,
        }
    }
}

/// Error from one stage, classified by `kind()`.
#[derive(Error, Debug)]
pub enum StageError {
    /// The job's input for this stage is unusable.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// The OS could not start the tool.
    #[error("{message}")]
    SpawnFailed { tool: String, message: String },

    /// The tool printed an error line.
    #[error("{tool}: {message}")]
    ToolReported { tool: String, message: String },

    /// The tool exited non-zero.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// The tool exceeded its time bound.
    #[error("{tool} timed out")]
    TimedOut { tool: String },

    /// The tool exited cleanly but the expected file is not there.
    #[error("{tool} finished but did not produce {}", .path.display())]
    MissingOutput { tool: String, path: PathBuf },

    /// Cancelled by the caller.
    #[error("Interrupted")]
    Interrupted,

    /// File I/O error around the tool run.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Taxonomy entry recorded on the job.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::InvalidInput(_) => ErrorKind::InvalidInput,
            StageError::SpawnFailed { .. } => ErrorKind::SpawnFailure,
            StageError::ToolReported { .. } => ErrorKind::ToolReportedError,
            StageError::CommandFailed { .. }
            | StageError::TimedOut { .. }
            | StageError::MissingOutput { .. }
            | StageError::Io { .. } => ErrorKind::NonZeroExit,
            StageError::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.kind(), self.to_string())
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;
