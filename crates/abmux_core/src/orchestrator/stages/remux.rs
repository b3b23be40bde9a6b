//! Remux stage - package the raw audio into the container as a named part.

use std::path::Path;

use crate::models::Job;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{remove_if_exists, require_output, Stage};
use crate::orchestrator::types::{Context, StageKind};
use crate::process::{Invocation, OutputInterpreter};

/// `MP4Box -brand "M4B " -ab mp71 -ipod -add <raw>:name=Part N:lang=eng <temp>`.
///
/// The raw file is consumed: it is deleted once the container exists.
#[derive(Debug, Default)]
pub struct RemuxStage;

impl RemuxStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for RemuxStage {
    fn kind(&self) -> StageKind {
        StageKind::Remux
    }

    fn validate_input(&self, job: &Job, _ctx: &Context) -> StageResult<()> {
        if !job.working_paths.raw_audio.is_file() {
            return Err(StageError::invalid_input(format!(
                "Raw audio not found: {}",
                job.working_paths.raw_audio.display()
            )));
        }
        Ok(())
    }

    fn output_path<'a>(&self, job: &'a Job) -> &'a Path {
        &job.working_paths.temp_container
    }

    fn invocation(&self, job: &Job, ctx: &Context) -> Invocation {
        let mux = &ctx.settings.mux;
        let mut track = job.working_paths.raw_audio.as_os_str().to_os_string();
        track.push(format!(
            ":name={} {}:lang={}",
            mux.part_label, job.part_number, mux.language
        ));

        Invocation::new(&ctx.tools.mp4box)
            .arg("-brand")
            .arg(mux.brand.as_str())
            .arg("-ab")
            .arg(mux.audio_brand.as_str())
            .arg("-ipod")
            .arg("-add")
            .arg(track)
            .path_arg(&job.working_paths.temp_container)
    }

    fn interpreter(&self, ctx: &Context) -> OutputInterpreter {
        OutputInterpreter::Remux {
            import_complete_threshold: ctx.settings.mux.import_complete_threshold,
        }
    }

    fn on_success(&self, job: &Job, ctx: &Context) -> StageResult<()> {
        require_output(self.output_path(job), self.name())?;
        ctx.logger
            .debug(&format!("Removing {}", job.working_paths.raw_audio.display()));
        remove_if_exists(&job.working_paths.raw_audio)
    }
}
