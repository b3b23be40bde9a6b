//! Pipeline runner that moves one job through its stages.

use std::path::PathBuf;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::models::{Job, JobState};
use crate::process::{ProcessRunner, RunOutcome, RunnerEvent};

use super::errors::{PipelineError, PipelineResult, StageError, StageResult};
use super::stage::{remove_if_exists, Stage};
use super::stages::{DemuxStage, RemuxStage, TagStage};
use super::types::{Context, PipelineEvent, StageKind};

/// Sequence of stages run for each job.
///
/// Stages run strictly in order; a stage only starts after the previous
/// one exited cleanly and produced its output. Any failure or
/// cancellation removes the job's intermediate files before returning.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    runner: ProcessRunner,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            runner: ProcessRunner::new(),
        }
    }

    /// Demux, Remux, Tag.
    pub fn standard() -> Self {
        Self::new()
            .with_stage(DemuxStage::new())
            .with_stage(RemuxStage::new())
            .with_stage(TagStage::new())
    }

    /// Add a stage (builder pattern).
    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage for `job`, returning the final output path.
    ///
    /// On return the job is in a terminal state: Done, Failed (with
    /// `last_error` set) or Cancelled.
    pub async fn run(
        &self,
        job: &mut Job,
        ctx: &Context,
        cancel: &CancellationToken,
        events: &UnboundedSender<PipelineEvent>,
    ) -> PipelineResult<PathBuf> {
        let job_name = job.display_name();

        for stage in &self.stages {
            let kind = stage.kind();
            if !job.transition(kind.active_state()) {
                let err = StageError::invalid_input(format!(
                    "cannot enter {} from state {}",
                    kind,
                    job.state()
                ));
                self.fail(job, ctx, kind, &err);
                return Err(PipelineError::stage_failed(&job_name, stage.name(), err));
            }

            ctx.logger.stage(stage.name());
            emit_progress(events, job, kind, 0, Some(format!("Starting {}", kind)));

            match self.run_stage(stage.as_ref(), job, ctx, cancel, events).await {
                Ok(()) => {
                    emit_progress(events, job, kind, 100, None);
                    ctx.logger.success(&format!("{} completed", stage.name()));
                }
                Err(StageError::Interrupted) => {
                    ctx.logger.warn(&format!("{} interrupted", stage.name()));
                    emit_progress(events, job, kind, 100, Some("Interrupted".to_string()));
                    cleanup(job, ctx, kind);
                    job.cancel();
                    return Err(PipelineError::cancelled(&job_name));
                }
                Err(err) => {
                    self.fail(job, ctx, kind, &err);
                    return Err(PipelineError::stage_failed(&job_name, stage.name(), err));
                }
            }
        }

        job.transition(JobState::Done);
        ctx.logger.success("All stages completed");
        Ok(job.working_paths.final_output.clone())
    }

    fn fail(&self, job: &mut Job, ctx: &Context, kind: StageKind, err: &StageError) {
        ctx.logger.error(&format!("{} failed: {}", kind, err));
        ctx.logger.show_tail(kind.name());
        cleanup(job, ctx, kind);
        job.fail(err.to_job_error());
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        job: &Job,
        ctx: &Context,
        cancel: &CancellationToken,
        events: &UnboundedSender<PipelineEvent>,
    ) -> StageResult<()> {
        if cancel.is_cancelled() {
            return Err(StageError::Interrupted);
        }

        stage.validate_input(job, ctx)?;
        stage.prepare(job)?;

        let invocation = stage.invocation(job, ctx).interpreter(stage.interpreter(ctx));
        let tool = invocation.tool_name();
        ctx.logger.command(invocation.program(), invocation.get_args());
        ctx.logger.clear_tail();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = self.runner;
        let token = cancel.clone();
        let handle = tokio::spawn(async move { runner.run(invocation, token, tx).await });

        let kind = stage.kind();
        let mut percent = 0;
        while let Some(event) = rx.recv().await {
            match event {
                RunnerEvent::Progress(p) => {
                    percent = p;
                    ctx.logger.progress(stage.name(), p);
                    emit_progress(events, job, kind, p, None);
                }
                RunnerEvent::Phase(phase) => {
                    ctx.logger.debug(&format!("{}: {}", stage.name(), phase));
                    emit_progress(events, job, kind, percent, Some(phase));
                }
                RunnerEvent::Output(line) => ctx.logger.output_line(&line),
            }
        }

        let outcome = handle.await.unwrap_or_else(|e| RunOutcome::SpawnFailed {
            message: format!("{} runner task failed: {}", tool, e),
        });

        match outcome {
            RunOutcome::Completed => stage.on_success(job, ctx),
            RunOutcome::Killed => Err(StageError::Interrupted),
            RunOutcome::ToolError { message } => Err(StageError::ToolReported { tool, message }),
            RunOutcome::NonZeroExit { code, last_line } => Err(StageError::CommandFailed {
                tool,
                exit_code: code,
                message: last_line.unwrap_or_else(|| "no output".to_string()),
            }),
            RunOutcome::TimedOut => Err(StageError::TimedOut { tool }),
            RunOutcome::SpawnFailed { message } => Err(StageError::SpawnFailed { tool, message }),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

fn emit_progress(
    events: &UnboundedSender<PipelineEvent>,
    job: &Job,
    stage: StageKind,
    percent: u32,
    message: Option<String>,
) {
    let _ = events.send(PipelineEvent::Progress {
        job_id: job.id.clone(),
        stage,
        percent,
        message,
    });
}

/// Remove everything not yet promoted. The final file only counts as
/// promoted once Tag succeeded, so it goes too when Tag was the stage
/// that failed.
fn cleanup(job: &Job, ctx: &Context, failed_stage: StageKind) {
    let paths = &job.working_paths;
    let mut doomed: Vec<&std::path::Path> = paths.intermediates().to_vec();
    if failed_stage == StageKind::Tag {
        doomed.push(&paths.final_output);
    }

    for path in doomed {
        if let Err(e) = remove_if_exists(path) {
            ctx.logger.warn(&format!("Cleanup failed: {}", e));
        }
    }
}
