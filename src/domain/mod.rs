//! Domain types for the podx pipeline.
//!
//! - Kinds: logical pipeline stages
//! - Artifacts: snapshot of what a working directory contains
//! - Transcript: segmented transcript documents
//! - Episode: episode and audio metadata documents

pub mod artifact;
pub mod episode;
pub mod kind;
pub mod transcript;

// Re-export commonly used types
pub use artifact::EpisodeArtifacts;
pub use episode::{slugify, AudioMeta, EpisodeMeta};
pub use kind::PipelineStepKind;
pub use transcript::{Segment, Transcript, Word};
