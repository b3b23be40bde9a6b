//! Pipeline stage implementations.
//!
//! Demux and Remux drive MP4Box, Tag drives AtomicParsley.

mod demux;
mod remux;
mod tag;

pub use demux::DemuxStage;
pub use remux::RemuxStage;
pub use tag::TagStage;
