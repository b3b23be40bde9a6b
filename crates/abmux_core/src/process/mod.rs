//! External process execution.
//!
//! - `Invocation`: program, arguments, optional timeout, output interpreter
//! - `OutputInterpreter`: per-tool mapping from output lines to progress or errors
//! - `ProcessRunner`: async spawn/stream/kill with a single terminal outcome

mod interpret;
mod invocation;
mod runner;

pub use interpret::{extract_percent, extract_percent_token, LineSignal, OutputInterpreter};
pub use invocation::Invocation;
pub use runner::{ProcessRunner, RunOutcome, RunnerEvent, DEFAULT_DRAIN_GRACE};
