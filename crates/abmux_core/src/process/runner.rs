//! Async external process runner.
//!
//! Spawns one command, merges its stdout and stderr into a single line
//! stream, feeds each line to the invocation's interpreter and reports
//! progress on a channel. Ends with exactly one `RunOutcome`.

use std::future::pending;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use super::interpret::LineSignal;
use super::invocation::Invocation;

/// Default time allowed for a killed process to release its pipes.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Event emitted while a process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// Clamped, non-decreasing percentage.
    Progress(u32),
    /// The tool entered a new named phase.
    Phase(String),
    /// One raw output line.
    Output(String),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exit code zero and no error line.
    Completed,
    /// Non-zero exit with no more specific error parsed.
    NonZeroExit {
        code: i32,
        last_line: Option<String>,
    },
    /// The interpreter matched an error line. The process was killed.
    ToolError { message: String },
    TimedOut,
    /// Cancelled by the caller.
    Killed,
    SpawnFailed { message: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Runs external tools. Stateless apart from the drain grace period.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    drain_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drain_grace(drain_grace: Duration) -> Self {
        Self { drain_grace }
    }

    /// Run `invocation` to completion, cancellation or timeout.
    ///
    /// Events are sent on `events`; the sender is dropped when this returns,
    /// so a receiver loop ends right after the last event of the run.
    pub async fn run(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
        events: UnboundedSender<RunnerEvent>,
    ) -> RunOutcome {
        let tool = invocation.tool_name();
        let interpreter = invocation.get_interpreter();

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn {}: {}", tool, e);
                return RunOutcome::SpawnFailed {
                    message: format!("Failed to start {}: {}", tool, e),
                };
            }
        };
        tracing::debug!("Spawned {} (pid {:?})", tool, child.id());

        let (line_tx, mut lines) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let deadline = invocation.get_timeout().map(|t| Instant::now() + t);
        let expired = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut last_percent: Option<u32> = None;
        let mut last_phase: Option<String> = None;
        let mut last_line: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Cancelling {}", tool);
                    self.terminate(&mut child, &mut lines, &events).await;
                    return RunOutcome::Killed;
                }
                _ = &mut expired => {
                    tracing::warn!("{} timed out", tool);
                    self.terminate(&mut child, &mut lines, &events).await;
                    return RunOutcome::TimedOut;
                }
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    let _ = events.send(RunnerEvent::Output(line.clone()));

                    match interpreter.interpret(&line) {
                        LineSignal::Progress { percent, phase } => {
                            if let Some(phase) = phase {
                                if last_phase.as_deref() != Some(phase.as_str()) {
                                    let _ = events.send(RunnerEvent::Phase(phase.clone()));
                                    last_phase = Some(phase);
                                }
                            }
                            let percent = percent.min(100);
                            if last_percent.map_or(true, |last| percent >= last) {
                                last_percent = Some(percent);
                                let _ = events.send(RunnerEvent::Progress(percent));
                            }
                        }
                        LineSignal::Error(message) => {
                            tracing::warn!("{} reported an error: {}", tool, message);
                            self.terminate(&mut child, &mut lines, &events).await;
                            return RunOutcome::ToolError { message };
                        }
                        LineSignal::Unparsed => {
                            tracing::debug!("{}: unreadable status line {:?}", tool, line);
                        }
                        LineSignal::Nothing => {}
                    }
                    last_line = Some(line);
                }
            }
        }

        // Pipes closed; the exit itself is still bounded by cancel and timeout.
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.terminate(&mut child, &mut lines, &events).await;
                return RunOutcome::Killed;
            }
            _ = &mut expired => {
                self.terminate(&mut child, &mut lines, &events).await;
                return RunOutcome::TimedOut;
            }
            status = child.wait() => status,
        };

        match status {
            Ok(status) if status.success() => RunOutcome::Completed,
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                tracing::debug!("{} exited with code {}", tool, code);
                RunOutcome::NonZeroExit { code, last_line }
            }
            Err(e) => RunOutcome::NonZeroExit {
                code: -1,
                last_line: Some(format!("Failed to wait for {}: {}", tool, e)),
            },
        }
    }

    /// Kill the child and forward whatever output arrives within the grace period.
    async fn terminate(
        &self,
        child: &mut Child,
        lines: &mut UnboundedReceiver<String>,
        events: &UnboundedSender<RunnerEvent>,
    ) {
        if let Err(e) = child.start_kill() {
            tracing::debug!("Kill failed (process already gone?): {}", e);
        }

        let drain = async {
            let _ = child.wait().await;
            while let Some(line) = lines.recv().await {
                let _ = events.send(RunnerEvent::Output(line));
            }
        };
        if timeout(self.drain_grace, drain).await.is_err() {
            tracing::debug!(
                "Output still open {}ms after kill, abandoning it",
                self.drain_grace.as_millis()
            );
        }
    }
}

/// Read `reader` to EOF, sending each `\n`- or `\r`-terminated segment.
async fn pump_lines<R>(mut reader: R, tx: UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut pending = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("Pipe read failed: {}", e);
                break;
            }
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !flush_segment(&mut pending, &tx) {
                    return;
                }
            } else {
                pending.push(byte);
            }
        }
    }
    flush_segment(&mut pending, &tx);
}

/// Send the buffered segment if it has content. False once the receiver is gone.
fn flush_segment(pending: &mut Vec<u8>, tx: &UnboundedSender<String>) -> bool {
    let text = String::from_utf8_lossy(pending);
    let line = text.trim();
    let open = line.is_empty() || tx.send(line.to_string()).is_ok();
    pending.clear();
    open
}
