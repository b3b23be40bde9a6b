//! Pre-flight health check of external tool binaries.
//!
//! Each binary is probed at most once per `ToolProbe`: existence, execute
//! permission (granted once if missing), then a short introspection run
//! that must exit zero within the timeout. The caller decides what to do
//! with a bad result.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::models::{ErrorKind, JobError};
use crate::process::{Invocation, OutputInterpreter, ProcessRunner, RunOutcome};

/// Result of probing one binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ok,
    NotFound,
    NotExecutable,
    NonZeroExit(i32),
    Timeout,
}

impl ProbeStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeStatus::Ok)
    }

    /// Error kind for a failed probe, `None` when healthy.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ProbeStatus::Ok => None,
            ProbeStatus::NotFound | ProbeStatus::NotExecutable => {
                Some(ErrorKind::BinaryUnavailable)
            }
            ProbeStatus::NonZeroExit(_) | ProbeStatus::Timeout => Some(ErrorKind::BinaryUnhealthy),
        }
    }

    /// Diagnosis suitable for display, `None` when healthy.
    pub fn to_error(&self, binary: &Path) -> Option<JobError> {
        let kind = self.error_kind()?;
        Some(JobError::new(kind, format!("{}: {}", binary.display(), self)))
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Ok => f.write_str("ok"),
            ProbeStatus::NotFound => f.write_str("not found"),
            ProbeStatus::NotExecutable => f.write_str("not executable"),
            ProbeStatus::NonZeroExit(code) => write!(f, "test run exited with code {}", code),
            ProbeStatus::Timeout => f.write_str("test run timed out"),
        }
    }
}

/// Probes binaries and remembers the results.
pub struct ToolProbe {
    runner: ProcessRunner,
    timeout: Duration,
    cache: Mutex<HashMap<PathBuf, ProbeStatus>>,
    runs: AtomicUsize,
}

impl ToolProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            runner: ProcessRunner::new(),
            timeout,
            cache: Mutex::new(HashMap::new()),
            runs: AtomicUsize::new(0),
        }
    }

    /// Probe `binary` by running it with `args`.
    ///
    /// Later calls for the same path return the first result without
    /// touching the filesystem or spawning anything.
    pub async fn probe(&self, binary: &Path, args: &[String]) -> ProbeStatus {
        let mut cache = self.cache.lock().await;
        if let Some(status) = cache.get(binary) {
            tracing::trace!("Probe cache hit for {}", binary.display());
            return *status;
        }

        let status = self.check(binary, args).await;
        match status {
            ProbeStatus::Ok => tracing::info!("{} is healthy", binary.display()),
            _ => tracing::warn!("Probe of {} failed: {}", binary.display(), status),
        }
        cache.insert(binary.to_path_buf(), status);
        status
    }

    /// Number of probe processes actually spawned.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Relaxed)
    }

    async fn check(&self, binary: &Path, args: &[String]) -> ProbeStatus {
        if !binary.is_file() {
            return ProbeStatus::NotFound;
        }
        match ensure_executable(binary) {
            Ok(true) => {}
            Ok(false) => return ProbeStatus::NotExecutable,
            Err(e) => {
                tracing::warn!("Cannot make {} executable: {}", binary.display(), e);
                return ProbeStatus::NotExecutable;
            }
        }

        let invocation = Invocation::new(binary)
            .args(args.iter().cloned())
            .timeout(self.timeout)
            .interpreter(OutputInterpreter::Passive);

        self.runs.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = self
            .runner
            .run(invocation, CancellationToken::new(), tx)
            .await;
        while let Ok(event) = rx.try_recv() {
            tracing::trace!("probe {}: {:?}", binary.display(), event);
        }

        match outcome {
            RunOutcome::Completed => ProbeStatus::Ok,
            RunOutcome::NonZeroExit { code, .. } => ProbeStatus::NonZeroExit(code),
            RunOutcome::TimedOut | RunOutcome::Killed => ProbeStatus::Timeout,
            // Passive interpreter never reports tool errors.
            RunOutcome::ToolError { .. } => ProbeStatus::NonZeroExit(-1),
            RunOutcome::SpawnFailed { message } => {
                tracing::warn!("{}", message);
                ProbeStatus::NotExecutable
            }
        }
    }
}

/// Make sure `path` carries an execute bit, adding owner/group execute once
/// if it has none. Returns whether it is executable afterwards.
#[cfg(unix)]
fn ensure_executable(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o111 != 0 {
        return Ok(true);
    }

    tracing::info!(
        "{} is not executable, adding owner/group execute permission",
        path.display()
    );
    permissions.set_mode(mode | 0o110);
    std::fs::set_permissions(path, permissions)?;

    Ok(std::fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn mode_of(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[tokio::test]
    async fn missing_binary_is_not_found_without_spawning() {
        let probe = ToolProbe::new(Duration::from_secs(2));
        let status = probe.probe(Path::new("/nonexistent/MP4Box"), &[]).await;

        assert_eq!(status, ProbeStatus::NotFound);
        assert_eq!(status.error_kind(), Some(ErrorKind::BinaryUnavailable));
        assert_eq!(probe.runs(), 0);
    }

    #[tokio::test]
    async fn grants_execute_permission_once() {
        let dir = tempdir().unwrap();
        let tool = script(dir.path(), "MP4Box", "exit 0", 0o644);

        let probe = ToolProbe::new(Duration::from_secs(2));
        assert_eq!(probe.probe(&tool, &[]).await, ProbeStatus::Ok);
        assert_eq!(mode_of(&tool), 0o754);

        // Revoke again: the cached result stands and nothing is re-granted.
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(probe.probe(&tool, &[]).await, ProbeStatus::Ok);
        assert_eq!(mode_of(&tool), 0o644);
        assert_eq!(probe.runs(), 1);
    }

    #[tokio::test]
    async fn non_zero_exit_is_unhealthy() {
        let dir = tempdir().unwrap();
        let tool = script(dir.path(), "AtomicParsley", "echo bad >&2; exit 3", 0o755);

        let probe = ToolProbe::new(Duration::from_secs(2));
        let status = probe.probe(&tool, &["--version".to_string()]).await;
        assert_eq!(status, ProbeStatus::NonZeroExit(3));
        assert_eq!(status.error_kind(), Some(ErrorKind::BinaryUnhealthy));
        assert!(status.to_error(&tool).unwrap().message.contains("code 3"));
    }

    #[tokio::test]
    async fn slow_binary_times_out() {
        let dir = tempdir().unwrap();
        let tool = script(dir.path(), "MP4Box", "exec sleep 5", 0o755);

        let probe = ToolProbe::new(Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert_eq!(probe.probe(&tool, &[]).await, ProbeStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn healthy_probe_is_cached() {
        let dir = tempdir().unwrap();
        let tool = script(dir.path(), "MP4Box", "echo 'MP4Box - GPAC version 2.2'", 0o755);

        let probe = ToolProbe::new(Duration::from_secs(2));
        let args = ["-h".to_string(), "general".to_string()];
        assert!(probe.probe(&tool, &args).await.is_ok());
        assert!(probe.probe(&tool, &args).await.is_ok());
        assert_eq!(probe.runs(), 1);
    }
}
