//! Pipeline orchestrator for coordinating job execution.
//!
//! Each job is one source file that moves through three stages, each
//! driving one external tool run. Jobs are processed strictly one after
//! another.
//!
//! # Architecture
//!
//! ```text
//! QueueProcessor
//!     └── Pipeline (per job)
//!             ├── Stage: Demux  (MP4Box -raw)
//!             ├── Stage: Remux  (MP4Box -add)
//!             └── Stage: Tag    (AtomicParsley)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use abmux_core::config::Settings;
//! use abmux_core::orchestrator::{PipelineEvent, QueueProcessor, ToolPaths};
//!
//! # async fn run(jobs: Vec<abmux_core::models::Job>, tools: ToolPaths) {
//! let mut handle = QueueProcessor::new(Settings::default(), tools, ".logs".into()).start(jobs);
//! while let Some(event) = handle.next_event().await {
//!     if let PipelineEvent::Progress { stage, percent, .. } = event {
//!         println!("{stage}: {percent}%");
//!     }
//! }
//! let report = handle.wait().await.unwrap();
//! println!("{} done", report.succeeded());
//! # }
//! ```

mod errors;
mod pipeline;
mod queue_processor;
mod stage;
pub mod stages;
mod types;

pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::Pipeline;
pub use queue_processor::{JobReport, QueueHandle, QueueProcessor, QueueReport};
pub use stage::{remove_if_exists, require_output, Stage};
pub use stages::{DemuxStage, RemuxStage, TagStage};
pub use types::{Context, PipelineEvent, StageKind, ToolPaths};
