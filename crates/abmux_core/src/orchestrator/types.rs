//! Core types for the orchestrator pipeline.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{Settings, ToolSettings};
use crate::logging::JobLogger;
use crate::models::{JobError, JobState};
use crate::paths::PathResolver;

/// The three pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Demux,
    Remux,
    Tag,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Demux => "Demux",
            StageKind::Remux => "Remux",
            StageKind::Tag => "Tag",
        }
    }

    /// Job state while this stage is running.
    pub fn active_state(&self) -> JobState {
        match self {
            StageKind::Demux => JobState::Demuxing,
            StageKind::Remux => JobState::Remuxing,
            StageKind::Tag => JobState::Tagging,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Absolute paths of the two external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Demux and remux tool.
    pub mp4box: PathBuf,
    /// Tagging tool.
    pub atomicparsley: PathBuf,
}

impl ToolPaths {
    pub fn resolve(resolver: &PathResolver, tools: &ToolSettings) -> Self {
        Self {
            mp4box: resolver.resolve_binary(&tools.mp4box),
            atomicparsley: resolver.resolve_binary(&tools.atomicparsley),
        }
    }
}

/// Read-only context passed to stages for one job.
pub struct Context {
    /// Application settings.
    pub settings: Arc<Settings>,
    pub tools: ToolPaths,
    /// Per-job logger.
    pub logger: Arc<JobLogger>,
}

impl Context {
    pub fn new(settings: Arc<Settings>, tools: ToolPaths, logger: Arc<JobLogger>) -> Self {
        Self {
            settings,
            tools,
            logger,
        }
    }
}

/// Event published to the caller while the queue runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Stage progress. Non-decreasing within one stage; 0 at start,
    /// 100 at the end (message "Interrupted" when cancelled).
    Progress {
        job_id: String,
        stage: StageKind,
        percent: u32,
        message: Option<String>,
    },
    /// One formatted job log line.
    Log { job_id: String, line: String },
    /// Last event for a job.
    Finished {
        job_id: String,
        state: JobState,
        error: Option<JobError>,
        output: Option<PathBuf>,
    },
}

impl PipelineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            PipelineEvent::Progress { job_id, .. }
            | PipelineEvent::Log { job_id, .. }
            | PipelineEvent::Finished { job_id, .. } => job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_kinds_map_to_active_states() {
        assert_eq!(StageKind::Demux.active_state(), JobState::Demuxing);
        assert_eq!(StageKind::Remux.active_state(), JobState::Remuxing);
        assert_eq!(StageKind::Tag.active_state(), JobState::Tagging);
        assert_eq!(StageKind::Tag.to_string(), "Tag");
    }

    #[test]
    fn missing_tools_resolve_to_configured_path() {
        let resolver = PathResolver::new();
        let tools = ToolSettings {
            mp4box: "/nonexistent/MP4Box".to_string(),
            atomicparsley: "/nonexistent/AtomicParsley".to_string(),
            ..ToolSettings::default()
        };
        let paths = ToolPaths::resolve(&resolver, &tools);
        assert_eq!(paths.mp4box, PathBuf::from("/nonexistent/MP4Box"));
    }
}
