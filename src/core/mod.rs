//! Core orchestration logic.
//!
//! This module contains:
//! - ArtifactDetector: which steps already produced durable output
//! - RunState: persisted per-directory state for crash recovery
//! - WorkdirIndex: where each fetched source landed under the output root
//! - PipelineStep / StepContext / StepResult: the step contract
//! - Orchestrator: Main execution engine

pub mod context;
pub mod detector;
pub mod orchestrator;
pub mod progress;
pub mod run_state;
pub mod step;
pub mod workdir_index;

// Re-export commonly used types
pub use context::StepContext;
pub use detector::ArtifactDetector;
pub use orchestrator::{Orchestrator, RunOutcome, RunReport, StepRecord};
pub use progress::{ElapsedTicker, ProgressSink, SilentProgress, TracingProgress};
pub use run_state::RunState;
pub use step::{PipelineStep, StepError, StepResult};
pub use workdir_index::WorkdirIndex;
