//! Description of one external tool run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::interpret::OutputInterpreter;

/// One external command: program, arguments, optional time bound and the
/// interpreter applied to its output lines.
///
/// Arguments are passed straight to the OS; nothing is shell-interpreted.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Option<Duration>,
    interpreter: OutputInterpreter,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
            interpreter: OutputInterpreter::Passive,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Path argument, passed byte for byte.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn interpreter(mut self, interpreter: OutputInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_interpreter(&self) -> OutputInterpreter {
        self.interpreter
    }

    /// Program file name, for messages.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}
