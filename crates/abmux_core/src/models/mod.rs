//! Data models.
//!
//! - `Job`, its state machine and derived working paths
//! - The error record kept on failed jobs
//! - Book metadata and per-file tag sets

mod job;
mod tags;

pub use job::{ErrorKind, Job, JobError, JobState, WorkingPaths};
pub use tags::{BookMetadata, TagSet};
