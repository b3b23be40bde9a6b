//! Job structures: one source file moving through demux, remux and tag.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::tags::TagSet;

/// Lifecycle state of a job.
///
/// The active states are ordered; a job only ever moves forward through
/// them and may leave to a terminal state from any active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobState {
    #[default]
    Pending,
    Demuxing,
    Remuxing,
    Tagging,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    /// Done, Failed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    /// Position in the forward pipeline order (terminal states share the last slot).
    fn rank(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Demuxing => 1,
            JobState::Remuxing => 2,
            JobState::Tagging => 3,
            JobState::Done | JobState::Failed | JobState::Cancelled => 4,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobState::Failed | JobState::Cancelled => true,
            JobState::Pending => false,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Demuxing => "demuxing",
            JobState::Remuxing => "remuxing",
            JobState::Tagging => "tagging",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Classification of a job-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Probe target missing or could not be made executable.
    BinaryUnavailable,
    /// Probe invocation returned non-zero or timed out.
    BinaryUnhealthy,
    /// The OS could not start the process.
    SpawnFailure,
    /// A stage's output interpreter matched a tool error marker.
    ToolReportedError,
    /// Non-zero exit with no more specific error parsed.
    NonZeroExit,
    /// A progress line could not be interpreted. Never fatal.
    ParseAnomaly,
    /// Cancelled by the caller.
    Interrupted,
    /// The job itself is unusable (missing input, output would clobber source).
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::BinaryUnavailable => "binary unavailable",
            ErrorKind::BinaryUnhealthy => "binary unhealthy",
            ErrorKind::SpawnFailure => "spawn failure",
            ErrorKind::ToolReportedError => "tool reported error",
            ErrorKind::NonZeroExit => "non-zero exit",
            ErrorKind::ParseAnomaly => "parse anomaly",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

/// Error record kept on a failed or cancelled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    /// Message suitable for direct display.
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Temporary and final file paths for one source file.
///
/// Everything lives next to the source and is derived from its base name
/// alone. Sources in one folder that differ only by extension map to the
/// same files; discovery rejects such sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingPaths {
    /// `<dir>/<stem>_demux.<raw ext>`
    pub raw_audio: PathBuf,
    /// `<dir>/<stem>_temp.<container ext>`
    pub temp_container: PathBuf,
    /// `<dir>/<stem>.<container ext>`
    pub final_output: PathBuf,
}

impl WorkingPaths {
    pub fn derive(source: &Path, raw_extension: &str, container_extension: &str) -> Self {
        let dir = source.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = source.file_stem().unwrap_or_default();
        let named = |suffix: &str, ext: &str| {
            let mut name = stem.to_os_string();
            name.push(suffix);
            name.push(".");
            name.push(ext);
            dir.join(name)
        };

        Self {
            raw_audio: named("_demux", raw_extension),
            temp_container: named("_temp", container_extension),
            final_output: named("", container_extension),
        }
    }

    /// True when any file of `self` is also a file of `other`.
    pub fn overlaps(&self, other: &WorkingPaths) -> bool {
        let mine = [&self.raw_audio, &self.temp_container, &self.final_output];
        let theirs = [&other.raw_audio, &other.temp_container, &other.final_output];
        mine.iter().any(|p| theirs.contains(p))
    }

    /// Intermediate files, in production order.
    pub fn intermediates(&self) -> [&Path; 2] {
        [&self.raw_audio, &self.temp_container]
    }
}

/// One source audio file moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Identifier used on every event for this job.
    pub id: String,
    pub source_path: PathBuf,
    /// 1-based part number used for the chapter label.
    pub part_number: u32,
    pub working_paths: WorkingPaths,
    pub tags: TagSet,
    state: JobState,
    last_error: Option<JobError>,
    /// When processing started (RFC 3339).
    pub started_at: Option<String>,
}

impl Job {
    /// Create a pending job. Working paths are computed here once and never change.
    pub fn new(
        id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        part_number: u32,
        tags: TagSet,
        raw_extension: &str,
        container_extension: &str,
    ) -> Self {
        let source_path = source_path.into();
        let working_paths = WorkingPaths::derive(&source_path, raw_extension, container_extension);
        Self {
            id: id.into(),
            source_path,
            part_number,
            working_paths,
            tags,
            state: JobState::Pending,
            last_error: None,
            started_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn last_error(&self) -> Option<&JobError> {
        self.last_error.as_ref()
    }

    /// Human-readable name (source file name).
    pub fn display_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }

    /// Move to `next`. Returns false (and leaves the state alone) if the
    /// transition would go backwards, skip a stage, or leave a terminal state.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Rejected state change {} -> {} for job {}",
                self.state,
                next,
                self.id
            );
            return false;
        }
        if self.state == JobState::Pending {
            self.started_at = Some(chrono::Local::now().to_rfc3339());
        }
        self.state = next;
        true
    }

    /// Mark the job failed with the given error.
    pub fn fail(&mut self, error: JobError) {
        if self.transition(JobState::Failed) {
            self.last_error = Some(error);
        }
    }

    /// Mark the job cancelled.
    pub fn cancel(&mut self) {
        if self.transition(JobState::Cancelled) {
            self.last_error = Some(JobError::new(ErrorKind::Interrupted, "Interrupted"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(source: &str) -> Job {
        Job::new("job-1", source, 3, TagSet::default(), "aac", "m4b")
    }

    #[test]
    fn working_paths_follow_source_name() {
        let paths = WorkingPaths::derive(Path::new("/books/X.src"), "aac", "m4b");
        assert_eq!(paths.raw_audio, PathBuf::from("/books/X_demux.aac"));
        assert_eq!(paths.temp_container, PathBuf::from("/books/X_temp.m4b"));
        assert_eq!(paths.final_output, PathBuf::from("/books/X.m4b"));
    }

    #[test]
    fn distinct_sources_never_share_working_files() {
        let a = WorkingPaths::derive(Path::new("/books/Chapter 1.m4a"), "aac", "m4b");
        let b = WorkingPaths::derive(Path::new("/books/Chapter 2.m4a"), "aac", "m4b");
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn same_stem_different_extension_overlaps() {
        let a = WorkingPaths::derive(Path::new("/books/01.m4a"), "aac", "m4b");
        let b = WorkingPaths::derive(Path::new("/books/01.mp4"), "aac", "m4b");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_stem_is_kept_byte_for_byte() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let source = Path::new(OsStr::from_bytes(b"/books/Kapitel \xe4.m4a"));
        let paths = WorkingPaths::derive(source, "aac", "m4b");
        assert_eq!(
            paths.final_output.as_os_str().as_bytes(),
            b"/books/Kapitel \xe4.m4b"
        );
        assert_eq!(
            paths.raw_audio.as_os_str().as_bytes(),
            b"/books/Kapitel \xe4_demux.aac"
        );
    }

    #[test]
    fn states_only_move_forward() {
        let mut j = job("/books/X.src");
        assert!(!j.transition(JobState::Remuxing));
        assert!(j.transition(JobState::Demuxing));
        assert!(j.started_at.is_some());
        assert!(j.transition(JobState::Remuxing));
        assert!(!j.transition(JobState::Demuxing));
        assert!(j.transition(JobState::Tagging));
        assert!(j.transition(JobState::Done));
        assert!(!j.transition(JobState::Failed));
        assert_eq!(j.state(), JobState::Done);
    }

    #[test]
    fn fail_records_error_once() {
        let mut j = job("/books/X.src");
        j.transition(JobState::Demuxing);
        j.fail(JobError::new(ErrorKind::ToolReportedError, "Error opening file"));
        j.cancel();

        assert_eq!(j.state(), JobState::Failed);
        assert_eq!(j.last_error().unwrap().kind, ErrorKind::ToolReportedError);
    }

    #[test]
    fn pending_job_can_be_cancelled() {
        let mut j = job("/books/X.src");
        j.cancel();
        assert_eq!(j.state(), JobState::Cancelled);
        assert_eq!(j.last_error().unwrap().kind, ErrorKind::Interrupted);
    }
}
