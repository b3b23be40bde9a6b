//! Configuration management for the audiobook muxer.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Defaults for every missing key
//!
//! # Example
//!
//! ```no_run
//! use abmux_core::config::{ConfigManager, ConfigSection, FailurePolicy};
//!
//! let mut config = ConfigManager::new(ConfigManager::default_path());
//! config.load_or_create().unwrap();
//!
//! println!("MP4Box: {}", config.settings().tools.mp4box);
//!
//! config.settings_mut().queue.on_failure = FailurePolicy::Halt;
//! config.update_section(ConfigSection::Queue).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, FailurePolicy, LoggingSettings, MuxSettings, PathSettings, QueueSettings,
    Settings, TaggingSettings, ToolSettings,
};
