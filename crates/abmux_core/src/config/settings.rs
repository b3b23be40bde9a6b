//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// External tool locations and probe behaviour.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Remux (container packaging) settings.
    #[serde(default)]
    pub mux: MuxSettings,

    /// Fixed tag values written by the Tag stage.
    #[serde(default)]
    pub tagging: TaggingSettings,

    /// Queue scheduling policy.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder for per-job log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            logs_folder: default_logs_folder(),
        }
    }
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// MP4Box binary (name on PATH or explicit path). Used for demux and remux.
    #[serde(default = "default_mp4box")]
    pub mp4box: String,

    /// AtomicParsley binary (name on PATH or explicit path). Used for tagging.
    #[serde(default = "default_atomicparsley")]
    pub atomicparsley: String,

    /// Upper bound for a probe invocation, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Arguments used to probe MP4Box.
    #[serde(default = "default_mp4box_probe_args")]
    pub mp4box_probe_args: Vec<String>,

    /// Arguments used to probe AtomicParsley.
    #[serde(default = "default_atomicparsley_probe_args")]
    pub atomicparsley_probe_args: Vec<String>,
}

fn default_mp4box() -> String {
    "MP4Box".to_string()
}

fn default_atomicparsley() -> String {
    "AtomicParsley".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_mp4box_probe_args() -> Vec<String> {
    vec!["-h".to_string(), "general".to_string()]
}

fn default_atomicparsley_probe_args() -> Vec<String> {
    vec!["--version".to_string()]
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            mp4box: default_mp4box(),
            atomicparsley: default_atomicparsley(),
            probe_timeout_ms: default_probe_timeout_ms(),
            mp4box_probe_args: default_mp4box_probe_args(),
            atomicparsley_probe_args: default_atomicparsley_probe_args(),
        }
    }
}

/// Container packaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxSettings {
    /// Major brand passed to `-brand` (four characters, padded).
    #[serde(default = "default_brand")]
    pub brand: String,

    /// Alternate brand passed to `-ab`.
    #[serde(default = "default_audio_brand")]
    pub audio_brand: String,

    /// Track language code.
    #[serde(default = "default_language")]
    pub language: String,

    /// Label prefix for the chapter/part name (`Part 3`).
    #[serde(default = "default_part_label")]
    pub part_label: String,

    /// Extension of the intermediate raw audio file.
    #[serde(default = "default_raw_extension")]
    pub raw_extension: String,

    /// Extension of the container files (intermediate and final).
    #[serde(default = "default_container_extension")]
    pub container_extension: String,

    /// Importing progress at or above this value counts as stage complete.
    #[serde(default = "default_import_complete_threshold")]
    pub import_complete_threshold: u32,
}

fn default_brand() -> String {
    "M4B ".to_string()
}

fn default_audio_brand() -> String {
    "mp71".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_part_label() -> String {
    "Part".to_string()
}

fn default_raw_extension() -> String {
    "aac".to_string()
}

fn default_container_extension() -> String {
    "m4b".to_string()
}

fn default_import_complete_threshold() -> u32 {
    95
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            audio_brand: default_audio_brand(),
            language: default_language(),
            part_label: default_part_label(),
            raw_extension: default_raw_extension(),
            container_extension: default_container_extension(),
            import_complete_threshold: default_import_complete_threshold(),
        }
    }
}

/// Fixed values written by the Tag stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingSettings {
    #[serde(default = "default_genre")]
    pub genre: String,

    /// iTunes media kind (`--stik`).
    #[serde(default = "default_media_kind")]
    pub media_kind: String,

    /// Value passed to `--purchaseDate` (`timestamp` means "now").
    #[serde(default = "default_purchase_date")]
    pub purchase_date: String,
}

fn default_genre() -> String {
    "Audiobooks".to_string()
}

fn default_media_kind() -> String {
    "Audiobook".to_string()
}

fn default_purchase_date() -> String {
    "timestamp".to_string()
}

impl Default for TaggingSettings {
    fn default() -> Self {
        Self {
            genre: default_genre(),
            media_kind: default_media_kind(),
            purchase_date: default_purchase_date(),
        }
    }
}

/// What the queue does after a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next file.
    #[default]
    Continue,
    /// Stop the queue; remaining jobs are never started.
    Halt,
}

/// Queue scheduling settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines to show in tail on error.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Prefix job log lines with timestamps.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            show_timestamps: true,
        }
    }
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Tools,
    Mux,
    Tagging,
    Queue,
    Logging,
}

impl ConfigSection {
    /// TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Tools => "tools",
            ConfigSection::Mux => "mux",
            ConfigSection::Tagging => "tagging",
            ConfigSection::Queue => "queue",
            ConfigSection::Logging => "logging",
        }
    }

    /// All sections, in file order.
    pub fn all() -> [ConfigSection; 6] {
        [
            ConfigSection::Paths,
            ConfigSection::Tools,
            ConfigSection::Mux,
            ConfigSection::Tagging,
            ConfigSection::Queue,
            ConfigSection::Logging,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.mux.container_extension, "m4b");
        assert_eq!(settings.mux.brand, "M4B ");
        assert_eq!(settings.tools.probe_timeout_ms, 2000);
        assert_eq!(settings.queue.on_failure, FailurePolicy::Continue);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let settings: Settings =
            toml::from_str("[queue]\non_failure = \"halt\"\n[mux]\nlanguage = \"deu\"\n").unwrap();
        assert_eq!(settings.queue.on_failure, FailurePolicy::Halt);
        assert_eq!(settings.mux.language, "deu");
        assert_eq!(settings.mux.audio_brand, "mp71");
    }
}
