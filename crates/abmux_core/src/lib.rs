//! abmux core - audiobook demux/remux/tag pipeline
//!
//! This crate contains all pipeline logic with zero UI dependencies.
//! It drives MP4Box and AtomicParsley to turn a folder of single-track
//! audio files into tagged audiobook containers.

pub mod config;
pub mod discovery;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod paths;
pub mod probe;
pub mod process;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
