//! Tool output interpreters.
//!
//! Each stage maps raw output lines to a `LineSignal`. Progress is found by
//! pattern (a `NN%` token or an `(n/total)` ratio) rather than by column
//! offsets, since status-line layout drifts between tool versions and
//! platforms.

use std::sync::OnceLock;

use regex::Regex;

/// What one output line means to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSignal {
    /// A progress value, optionally with the tool's phase label.
    Progress { percent: u32, phase: Option<String> },
    /// The tool reported an error; the run is aborted with this message.
    Error(String),
    /// Looked like a status line but held no readable number. Not fatal.
    Unparsed,
    /// No signal.
    Nothing,
}

/// Per-stage interpretation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputInterpreter {
    /// Ignore output (probes).
    Passive,
    /// MP4Box `-raw` export.
    Demux,
    /// MP4Box `-add` import + write. Importing progress at or above the
    /// threshold counts as done.
    Remux { import_complete_threshold: u32 },
    /// AtomicParsley.
    Tag,
}

impl OutputInterpreter {
    pub fn interpret(&self, line: &str) -> LineSignal {
        let line = line.trim();
        if line.is_empty() {
            return LineSignal::Nothing;
        }

        match self {
            OutputInterpreter::Passive => LineSignal::Nothing,
            OutputInterpreter::Demux => interpret_demux(line),
            OutputInterpreter::Remux {
                import_complete_threshold,
            } => interpret_remux(line, *import_complete_threshold),
            OutputInterpreter::Tag => interpret_tag(line),
        }
    }
}

fn interpret_demux(line: &str) -> LineSignal {
    if is_mp4box_error(line) {
        return LineSignal::Error(line.to_string());
    }
    match extract_percent(line) {
        Some(percent) => LineSignal::Progress {
            percent,
            phase: status_label(line),
        },
        None if looks_like_status(line) => LineSignal::Unparsed,
        None => LineSignal::Nothing,
    }
}

fn interpret_remux(line: &str, threshold: u32) -> LineSignal {
    if is_mp4box_error(line) {
        return LineSignal::Error(line.to_string());
    }

    // Writing is fast compared to importing; reaching it means done.
    if line.contains("Writing") {
        return LineSignal::Progress {
            percent: 100,
            phase: status_label(line).or_else(|| Some("ISO File Writing".to_string())),
        };
    }

    if line.contains("Importing") {
        return match extract_percent(line) {
            Some(percent) => LineSignal::Progress {
                percent: if percent >= threshold { 100 } else { percent },
                phase: status_label(line),
            },
            None => LineSignal::Unparsed,
        };
    }

    LineSignal::Nothing
}

fn interpret_tag(line: &str) -> LineSignal {
    let lower = line.to_ascii_lowercase();
    if lower.starts_with("error")
        || lower.starts_with("ap error")
        || lower.contains("atomicparsley error")
    {
        return LineSignal::Error(line.to_string());
    }
    match extract_percent_token(line) {
        Some(percent) => LineSignal::Progress {
            percent,
            phase: None,
        },
        None => LineSignal::Nothing,
    }
}

/// MP4Box prints errors as lines starting with "Error" (e.g.
/// `Error opening file x: Requested URL is not valid`).
fn is_mp4box_error(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("error") || lower.contains("] error") || lower.contains(": error")
}

/// MP4Box status lines look like `Importing AAC: |=====     | (45/100)`.
fn looks_like_status(line: &str) -> bool {
    line.contains('|')
}

/// Label in front of the progress bar, e.g. `Importing AAC`.
fn status_label(line: &str) -> Option<String> {
    let (label, _) = line.split_once(": |")?;
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

fn percent_or_ratio() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]+)\s*%|\(([0-9]+)/([0-9]+)\)").expect("progress regex compiles")
    })
}

fn percent_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+)\s*%").expect("percent regex compiles"))
}

/// First progress value in the line: either `NN%` or `(n/total)`.
/// Ratios with a zero total are skipped.
pub fn extract_percent(line: &str) -> Option<u32> {
    percent_or_ratio().captures_iter(line).find_map(|caps| {
        if let Some(percent) = caps.get(1) {
            return Some(saturate(number(percent.as_str())));
        }
        let done = number(caps.get(2)?.as_str());
        let total = number(caps.get(3)?.as_str());
        (total > 0).then(|| saturate(done.saturating_mul(100) / total))
    })
}

/// First `NN%` token in the line.
pub fn extract_percent_token(line: &str) -> Option<u32> {
    let caps = percent_token().captures(line)?;
    Some(saturate(number(caps.get(1)?.as_str())))
}

/// Digits only; overflow saturates.
fn number(digits: &str) -> u64 {
    digits.parse().unwrap_or(u64::MAX)
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMUX: OutputInterpreter = OutputInterpreter::Remux {
        import_complete_threshold: 95,
    };

    #[test]
    fn extracts_percent_and_ratio() {
        assert_eq!(extract_percent("Media Export: |====   | (45/100)"), Some(45));
        assert_eq!(extract_percent("Progress: ====>  37%-"), Some(37));
        assert_eq!(extract_percent("step (3/4)"), Some(75));
        assert_eq!(extract_percent("track 1 of 2"), None);
        assert_eq!(extract_percent("(5/0) then 12%"), Some(12));
        assert_eq!(extract_percent("Importing: 100 %"), Some(100));
        assert_eq!(extract_percent("99999999999999999999999%"), Some(u32::MAX));
    }

    #[test]
    fn token_extraction_ignores_ratios() {
        assert_eq!(extract_percent_token("(45/100)"), None);
        assert_eq!(extract_percent_token(" Progress: ===> 88%-"), Some(88));
    }

    #[test]
    fn demux_lines() {
        let demux = OutputInterpreter::Demux;
        assert_eq!(
            demux.interpret("Media Export: |========            | (40/100)"),
            LineSignal::Progress {
                percent: 40,
                phase: Some("Media Export".to_string())
            }
        );
        assert_eq!(
            demux.interpret("Media Export: |====  | (garbled)"),
            LineSignal::Unparsed
        );
        assert_eq!(demux.interpret("Extracting AAC track"), LineSignal::Nothing);
        assert!(matches!(
            demux.interpret("Error opening file x.m4a: Requested URL is not valid"),
            LineSignal::Error(_)
        ));
    }

    #[test]
    fn remux_import_threshold_and_writing() {
        assert_eq!(
            REMUX.interpret("Importing AAC: |=====     | (50/100)"),
            LineSignal::Progress {
                percent: 50,
                phase: Some("Importing AAC".to_string())
            }
        );
        assert!(matches!(
            REMUX.interpret("Importing AAC: |==========| (96/100)"),
            LineSignal::Progress { percent: 100, .. }
        ));
        assert!(matches!(
            REMUX.interpret("ISO File Writing: |===       | (30/100)"),
            LineSignal::Progress { percent: 100, .. }
        ));
        assert_eq!(REMUX.interpret("Saving to x_temp.m4b"), LineSignal::Nothing);
        assert!(matches!(
            REMUX.interpret("[iso file] error: invalid box"),
            LineSignal::Error(_)
        ));
    }

    #[test]
    fn tag_lines() {
        let tag = OutputInterpreter::Tag;
        assert_eq!(
            tag.interpret("Progress: ================>  72%-"),
            LineSignal::Progress {
                percent: 72,
                phase: None
            }
        );
        assert_eq!(tag.interpret("Started writing to temp file."), LineSignal::Nothing);
        assert!(matches!(
            tag.interpret("AtomicParsley error: can't open x.m4b for reading"),
            LineSignal::Error(_)
        ));
    }

    #[test]
    fn passive_ignores_everything() {
        assert_eq!(
            OutputInterpreter::Passive.interpret("Error: 50%"),
            LineSignal::Nothing
        );
    }
}
