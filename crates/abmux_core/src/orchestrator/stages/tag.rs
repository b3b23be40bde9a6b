//! Tag stage - write metadata into the final container.

use std::path::Path;

use crate::models::Job;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{remove_if_exists, require_output, Stage};
use crate::orchestrator::types::{Context, StageKind};
use crate::process::{Invocation, OutputInterpreter};

/// AtomicParsley run that reads the temp container and writes the final file.
///
/// The temp container is deleted once the final file exists.
#[derive(Debug, Default)]
pub struct TagStage;

impl TagStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for TagStage {
    fn kind(&self) -> StageKind {
        StageKind::Tag
    }

    fn validate_input(&self, job: &Job, ctx: &Context) -> StageResult<()> {
        if !job.working_paths.temp_container.is_file() {
            return Err(StageError::invalid_input(format!(
                "Container not found: {}",
                job.working_paths.temp_container.display()
            )));
        }
        if let Some(cover) = &job.tags.cover {
            if !cover.is_file() {
                ctx.logger.warn(&format!(
                    "Cover image not found, skipping artwork: {}",
                    cover.display()
                ));
            }
        }
        Ok(())
    }

    fn output_path<'a>(&self, job: &'a Job) -> &'a Path {
        &job.working_paths.final_output
    }

    fn invocation(&self, job: &Job, ctx: &Context) -> Invocation {
        let tags = &job.tags;
        let tagging = &ctx.settings.tagging;

        let mut inv = Invocation::new(&ctx.tools.atomicparsley)
            .path_arg(&job.working_paths.temp_container)
            .arg("--artist")
            .arg(tags.artist.as_str())
            .arg("--albumArtist")
            .arg(tags.album_artist.as_str())
            .arg("--title")
            .arg(tags.title.as_str())
            .args(["--sortOrder", "name"])
            .arg(tags.sort_title.as_str())
            .arg("--album")
            .arg(tags.album.as_str())
            .arg("--tracknum")
            .arg(format!("{}/{}", tags.track, tags.total_tracks))
            .arg("--disk")
            .arg(tags.disk.to_string())
            .arg("--year")
            .arg(tags.year.as_str())
            .arg("--copyright")
            .arg(tags.copyright.as_str())
            .arg("--ISO-copyright")
            .arg(tags.copyright.as_str())
            .arg("--description")
            .arg(tags.description.as_str())
            .arg("--longdesc")
            .arg(tags.description.as_str())
            .arg("--storedesc")
            .arg(tags.description.as_str());

        if let Some(cover) = tags.cover.as_deref().filter(|c| c.is_file()) {
            inv = inv.arg("--artwork").path_arg(cover);
        }

        inv.arg("--genre")
            .arg(tagging.genre.as_str())
            .arg("--stik")
            .arg(tagging.media_kind.as_str())
            .args(["--comment", "", "--composer", ""])
            .arg("--purchaseDate")
            .arg(tagging.purchase_date.as_str())
            .args(["--encodingTool", "", "--encodedBy", ""])
            .arg("--output")
            .path_arg(&job.working_paths.final_output)
    }

    fn interpreter(&self, _ctx: &Context) -> OutputInterpreter {
        OutputInterpreter::Tag
    }

    fn on_success(&self, job: &Job, ctx: &Context) -> StageResult<()> {
        require_output(self.output_path(job), self.name())?;
        ctx.logger.debug(&format!(
            "Removing {}",
            job.working_paths.temp_container.display()
        ));
        remove_if_exists(&job.working_paths.temp_container)
    }
}
