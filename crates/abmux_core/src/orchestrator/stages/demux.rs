//! Demux stage - extract the raw audio track from the source file.

use std::path::Path;

use crate::models::Job;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Context, StageKind};
use crate::process::{Invocation, OutputInterpreter};

/// `MP4Box -raw 1 <source> -out <raw>`.
#[derive(Debug, Default)]
pub struct DemuxStage;

impl DemuxStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for DemuxStage {
    fn kind(&self) -> StageKind {
        StageKind::Demux
    }

    fn validate_input(&self, job: &Job, _ctx: &Context) -> StageResult<()> {
        if !job.source_path.is_file() {
            return Err(StageError::invalid_input(format!(
                "Source file not found: {}",
                job.source_path.display()
            )));
        }
        if job.working_paths.final_output == job.source_path {
            return Err(StageError::invalid_input(format!(
                "Output would overwrite the source: {}",
                job.source_path.display()
            )));
        }
        Ok(())
    }

    fn output_path<'a>(&self, job: &'a Job) -> &'a Path {
        &job.working_paths.raw_audio
    }

    fn invocation(&self, job: &Job, ctx: &Context) -> Invocation {
        Invocation::new(&ctx.tools.mp4box)
            .args(["-raw", "1"])
            .path_arg(&job.source_path)
            .arg("-out")
            .path_arg(&job.working_paths.raw_audio)
    }

    fn interpreter(&self, _ctx: &Context) -> OutputInterpreter {
        OutputInterpreter::Demux
    }
}
