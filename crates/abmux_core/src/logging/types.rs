//! Logging types and configuration.

use serde::{Deserialize, Serialize};

use crate::config::LoggingSettings;

/// Severity of a job log line, also the default `EnvFilter` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What a `JobLogger` writes and how much tool output it keeps.
///
/// Built from the `[logging]` settings section; `Default` is the
/// section's defaults.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Only every `progress_step` percent is written, and tool output goes
    /// to the tail buffer instead of the log.
    pub compact: bool,
    pub progress_step: u32,
    /// Tool output lines replayed when a stage fails.
    pub error_tail: usize,
    pub show_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level,
            compact: settings.compact,
            progress_step: settings.progress_step.max(1),
            error_tail: settings.error_tail as usize,
            show_timestamps: settings.show_timestamps,
        }
    }
}

/// Receives every formatted job log line.
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Marker put in front of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePrefix {
    /// `$ MP4Box -raw 1 ...`
    Command,
    /// `=== Demux ===`
    Stage,
    Success,
    Warning,
    Error,
}

impl MessagePrefix {
    pub fn format(&self, message: &str) -> String {
        match self {
            MessagePrefix::Command => format!("$ {}", message),
            MessagePrefix::Stage => format!("=== {} ===", message),
            MessagePrefix::Success => format!("[OK] {}", message),
            MessagePrefix::Warning => format!("[WARN] {}", message),
            MessagePrefix::Error => format!("[FAIL] {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_logging_section() {
        let settings = LoggingSettings {
            progress_step: 0,
            error_tail: 7,
            ..LoggingSettings::default()
        };
        let config = LogConfig::from(&settings);
        assert_eq!(config.progress_step, 1);
        assert_eq!(config.error_tail, 7);
        assert!(LogConfig::default().compact);
    }

    #[test]
    fn level_is_lowercase_in_settings() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(serde_json::to_string(&LogLevel::Debug).unwrap(), "\"debug\"");
    }
}
