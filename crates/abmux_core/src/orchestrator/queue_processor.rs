//! Queue processor for running jobs one after another.
//!
//! The `QueueProcessor` takes an ordered job list and runs each job
//! through the pipeline on a background task. The caller gets a
//! `QueueHandle` to read events, cancel, and collect the final report.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{FailurePolicy, Settings};
use crate::logging::{JobLogger, LogCallback, LogConfig};
use crate::models::{ErrorKind, Job, JobError, JobState};

use super::errors::{PipelineError, PipelineResult};
use super::pipeline::Pipeline;
use super::types::{Context, PipelineEvent, ToolPaths};

/// Terminal status of one job in a queue run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: String,
    pub source_path: PathBuf,
    /// Done, Failed, Cancelled, or Pending if never started.
    pub state: JobState,
    pub error: Option<JobError>,
    /// Final file, when Done.
    pub output_path: Option<PathBuf>,
}

impl JobReport {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            source_path: job.source_path.clone(),
            state: job.state(),
            error: job.last_error().cloned(),
            output_path: (job.state() == JobState::Done)
                .then(|| job.working_paths.final_output.clone()),
        }
    }
}

/// Result of a whole queue run, in job order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueReport {
    pub jobs: Vec<JobReport>,
}

impl QueueReport {
    pub fn succeeded(&self) -> usize {
        self.count(JobState::Done)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(JobState::Cancelled)
    }

    /// Jobs that were never started.
    pub fn skipped(&self) -> usize {
        self.count(JobState::Pending)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.jobs.is_empty() && self.succeeded() == self.jobs.len()
    }

    fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }
}

/// Handle to a running queue.
pub struct QueueHandle {
    events: UnboundedReceiver<PipelineEvent>,
    cancel: CancellationToken,
    join: JoinHandle<QueueReport>,
}

impl QueueHandle {
    /// Next event, or `None` once the queue has finished and every event
    /// was delivered.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Kill the active stage's process and start no further jobs.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this queue, for wiring to signal handlers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the queue to finish. Undelivered events are dropped.
    pub async fn wait(self) -> PipelineResult<QueueReport> {
        self.join
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))
    }
}

/// Runs jobs strictly one at a time through the pipeline.
pub struct QueueProcessor {
    settings: Arc<Settings>,
    tools: ToolPaths,
    /// Directory for per-job log files.
    log_dir: PathBuf,
    pipeline: Arc<Pipeline>,
}

impl QueueProcessor {
    pub fn new(settings: Settings, tools: ToolPaths, log_dir: PathBuf) -> Self {
        Self {
            settings: Arc::new(settings),
            tools,
            log_dir,
            pipeline: Arc::new(Pipeline::standard()),
        }
    }

    /// Replace the standard pipeline.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Start processing `jobs` in order on a background task.
    pub fn start(self, jobs: Vec<Job>) -> QueueHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move { self.process_queue(jobs, token, tx).await });

        QueueHandle {
            events: rx,
            cancel,
            join,
        }
    }

    async fn process_queue(
        self,
        mut jobs: Vec<Job>,
        cancel: CancellationToken,
        events: UnboundedSender<PipelineEvent>,
    ) -> QueueReport {
        let total = jobs.len();
        tracing::info!("Processing {} job(s)", total);

        for i in 0..total {
            if cancel.is_cancelled() {
                tracing::info!("Queue cancelled before job {}/{}", i + 1, total);
                break;
            }

            let (earlier, rest) = jobs.split_at_mut(i);
            let job = &mut rest[0];
            if let Some(other) = earlier
                .iter()
                .find(|e| e.working_paths.overlaps(&job.working_paths))
            {
                reject_collision(job, other, &events);
            } else {
                tracing::info!("Starting job {}/{}: {}", i + 1, total, job.display_name());
                self.process_job(job, cancel.child_token(), &events).await;
            }

            if job.state() == JobState::Failed
                && self.settings.queue.on_failure == FailurePolicy::Halt
            {
                tracing::warn!("Halting queue after failed job {}", job.display_name());
                break;
            }
        }

        let report = QueueReport {
            jobs: jobs.iter().map(JobReport::from_job).collect(),
        };
        tracing::info!(
            "Queue finished: {} done, {} failed, {} cancelled, {} not started",
            report.succeeded(),
            report.failed(),
            report.cancelled(),
            report.skipped()
        );
        report
    }

    async fn process_job(
        &self,
        job: &mut Job,
        cancel: CancellationToken,
        events: &UnboundedSender<PipelineEvent>,
    ) {
        let logger = Arc::new(self.create_logger(job, events));
        let ctx = Context::new(Arc::clone(&self.settings), self.tools.clone(), Arc::clone(&logger));

        logger.info(&format!("Source: {}", job.source_path.display()));
        let output = match self.pipeline.run(job, &ctx, &cancel, events).await {
            Ok(path) => {
                tracing::info!("Job {} done: {}", job.id, path.display());
                Some(path)
            }
            Err(e) => {
                match &e {
                    PipelineError::Cancelled { .. } => tracing::info!("{}", e),
                    _ => tracing::error!("{}", e),
                }
                None
            }
        };
        logger.close();

        let _ = events.send(PipelineEvent::Finished {
            job_id: job.id.clone(),
            state: job.state(),
            error: job.last_error().cloned(),
            output,
        });
    }

    /// File + event logger for `job`, falling back to events only when the
    /// log file cannot be created.
    fn create_logger(&self, job: &Job, events: &UnboundedSender<PipelineEvent>) -> JobLogger {
        let config = LogConfig::from(&self.settings.logging);
        let name = job.id.clone();

        let callback = |tx: UnboundedSender<PipelineEvent>, job_id: String| -> LogCallback {
            Box::new(move |line: &str| {
                let _ = tx.send(PipelineEvent::Log {
                    job_id: job_id.clone(),
                    line: line.to_string(),
                });
            })
        };

        match JobLogger::new(
            &name,
            &self.log_dir,
            config.clone(),
            Some(callback(events.clone(), job.id.clone())),
        ) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!(
                    "Cannot create log file in {}: {}",
                    self.log_dir.display(),
                    e
                );
                JobLogger::detached(name, config, Some(callback(events.clone(), job.id.clone())))
            }
        }
    }
}

/// Fail `job` without running it: its working files are those of `other`.
fn reject_collision(job: &mut Job, other: &Job, events: &UnboundedSender<PipelineEvent>) {
    let message = format!(
        "{} and {} would write the same files ({})",
        other.source_path.display(),
        job.source_path.display(),
        job.working_paths.final_output.display()
    );
    tracing::error!("Job {} rejected: {}", job.id, message);
    job.fail(JobError::new(ErrorKind::InvalidInput, message));

    let _ = events.send(PipelineEvent::Finished {
        job_id: job.id.clone(),
        state: job.state(),
        error: job.last_error().cloned(),
        output: None,
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::models::TagSet;
    use crate::orchestrator::errors::StageResult;
    use crate::orchestrator::stage::Stage;
    use crate::orchestrator::types::StageKind;
    use crate::process::{Invocation, OutputInterpreter};
    use tempfile::tempdir;

    /// Demux-only stage: fails for sources whose name contains "bad".
    struct FakeDemux;

    impl Stage for FakeDemux {
        fn kind(&self) -> StageKind {
            StageKind::Demux
        }

        fn validate_input(&self, _job: &Job, _ctx: &Context) -> StageResult<()> {
            Ok(())
        }

        fn output_path<'a>(&self, job: &'a Job) -> &'a Path {
            &job.working_paths.raw_audio
        }

        fn invocation(&self, job: &Job, _ctx: &Context) -> Invocation {
            let out = job.working_paths.raw_audio.to_string_lossy().into_owned();
            let script = if job.source_path.to_string_lossy().contains("bad") {
                "echo 'Error: unsupported file' >&2".to_string()
            } else {
                format!("echo raw > '{}'", out)
            };
            Invocation::new("sh").args(["-c".to_string(), script])
        }

        fn interpreter(&self, _ctx: &Context) -> OutputInterpreter {
            OutputInterpreter::Demux
        }
    }

    fn processor(dir: &Path, policy: FailurePolicy) -> QueueProcessor {
        let mut settings = Settings::default();
        settings.queue.on_failure = policy;
        let tools = ToolPaths {
            mp4box: "sh".into(),
            atomicparsley: "sh".into(),
        };
        QueueProcessor::new(settings, tools, dir.join("logs"))
            .with_pipeline(Pipeline::new().with_stage(FakeDemux))
    }

    fn jobs(dir: &Path, names: &[&str]) -> Vec<Job> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Job::new(
                    format!("job-{}", i + 1),
                    dir.join(name),
                    i as u32 + 1,
                    TagSet::default(),
                    "aac",
                    "m4b",
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn continues_past_failed_job_by_default() {
        let dir = tempdir().unwrap();
        let mut handle = processor(dir.path(), FailurePolicy::Continue)
            .start(jobs(dir.path(), &["a.m4a", "bad.m4a", "c.m4a"]));

        let mut finished = Vec::new();
        let mut logged = false;
        while let Some(event) = handle.next_event().await {
            match event {
                PipelineEvent::Finished { job_id, state, .. } => finished.push((job_id, state)),
                PipelineEvent::Log { .. } => logged = true,
                PipelineEvent::Progress { .. } => {}
            }
        }
        let report = handle.wait().await.unwrap();

        assert!(logged);
        assert_eq!(
            finished,
            [
                ("job-1".to_string(), JobState::Done),
                ("job-2".to_string(), JobState::Failed),
                ("job-3".to_string(), JobState::Done),
            ]
        );
        assert_eq!((report.succeeded(), report.failed()), (2, 1));
        assert!(!report.all_succeeded());
        assert_eq!(
            report.jobs[1].error.as_ref().unwrap().kind,
            ErrorKind::ToolReportedError
        );
        assert!(dir.path().join("logs").join("job-1.log").exists());
    }

    #[tokio::test]
    async fn halt_policy_leaves_rest_pending() {
        let dir = tempdir().unwrap();
        let handle = processor(dir.path(), FailurePolicy::Halt)
            .start(jobs(dir.path(), &["bad.m4a", "b.m4a"]));
        let report = handle.wait().await.unwrap();

        assert_eq!(report.jobs[0].state, JobState::Failed);
        assert_eq!(report.jobs[1].state, JobState::Pending);
        assert_eq!(report.skipped(), 1);
    }

    #[tokio::test]
    async fn cancelled_queue_starts_nothing() {
        let dir = tempdir().unwrap();
        let handle = processor(dir.path(), FailurePolicy::Continue)
            .start(jobs(dir.path(), &["a.m4a", "b.m4a"]));
        handle.cancel();
        let report = handle.wait().await.unwrap();

        // The test runtime is single-threaded, so the queue task has not run yet.
        assert_eq!(report.skipped(), 2);
        assert!(!dir.path().join("a_demux.aac").exists());
    }

    #[tokio::test]
    async fn colliding_job_is_rejected_without_running() {
        let dir = tempdir().unwrap();
        let handle = processor(dir.path(), FailurePolicy::Continue)
            .start(jobs(dir.path(), &["01.m4a", "01.mp4", "02.m4a"]));
        let report = handle.wait().await.unwrap();

        assert_eq!(report.jobs[0].state, JobState::Done);
        assert_eq!(report.jobs[1].state, JobState::Failed);
        let error = report.jobs[1].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
        assert!(error.message.contains("01.m4a"));
        assert!(error.message.contains("01.mp4"));
        assert_eq!(report.jobs[2].state, JobState::Done);

        let logs = dir.path().join("logs");
        assert!(logs.join("job-1.log").exists());
        assert!(!logs.join("job-2.log").exists());
    }

    #[test]
    fn empty_report_is_not_success() {
        assert!(!QueueReport::default().all_succeeded());
    }
}
