//! podx - Resumable podcast processing pipeline
//!
//! Fetches an episode, transcodes and transcribes it, optionally enhances
//! the transcript (preprocess, alignment, diarization), analyzes and
//! publishes it. Every heavy operation is an external command; the engine
//! sequences them and makes the whole run resumable.
//!
//! # Architecture
//!
//! The system is built around artifacts on disk:
//! - Each step's output is a file in the episode's working directory
//! - Steps whose output already exists are skipped, but still load it
//! - A run-state file records completed steps for crash recovery
//!
//! # Modules
//!
//! - `adapters`: External operations (command runner, text model)
//! - `core`: Orchestration logic (detector, run state, step contract)
//! - `steps`: Concrete pipeline steps
//! - `transform`: Transcript transforms used by preprocessing
//! - `domain`: Data structures (transcript, episode, step kinds)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process the episode of a show published on a date
//! podx run --show "Hard Fork" --date 2024-05-03 --diarize --deepcast
//!
//! # Inspect a working directory
//! podx status ./hard-fork/2024-05-03
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod steps;
pub mod transform;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, RunOutcome, RunReport, RunState, StepContext, StepResult};
pub use config::PipelineConfig;
pub use domain::{PipelineStepKind, Transcript};
