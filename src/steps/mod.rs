//! Concrete pipeline steps.
//!
//! Fixed order: Fetch → Transcode → Transcribe → Enhance (preprocess, align,
//! diarize) → Export → Analyze → Final export → Publish → Cleanup. Optional
//! steps decide for themselves whether they are enabled, because per-show
//! overrides applied by Fetch can change the configuration mid-run.

pub mod analyze;
pub mod cleanup;
pub mod enhance;
pub mod export;
pub mod fetch;
pub mod publish;
pub mod transcode;
pub mod transcribe;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::CommandRunner;
use crate::config::ShowConfigSource;
use crate::core::PipelineStep;

pub(crate) use crate::core::detector::file_safe;

pub use analyze::AnalyzeStep;
pub use cleanup::CleanupStep;
pub use enhance::EnhanceStep;
pub use export::{ExportStage, ExportStep};
pub use fetch::FetchStep;
pub use publish::PublishStep;
pub use transcode::TranscodeStep;
pub use transcribe::{select_model, TranscribeStep, MODEL_PREFERENCE};

/// All steps in execution order
pub fn build_pipeline(
    runner: Arc<dyn CommandRunner>,
    shows: Arc<dyn ShowConfigSource>,
) -> Vec<Box<dyn PipelineStep>> {
    vec![
        Box::new(FetchStep::new(Arc::clone(&runner), shows)),
        Box::new(TranscodeStep::new(Arc::clone(&runner))),
        Box::new(TranscribeStep::new(Arc::clone(&runner))),
        Box::new(EnhanceStep::new(Arc::clone(&runner))),
        Box::new(ExportStep::new(Arc::clone(&runner), ExportStage::Intermediate)),
        Box::new(AnalyzeStep::new(Arc::clone(&runner))),
        Box::new(ExportStep::new(Arc::clone(&runner), ExportStage::Final)),
        Box::new(PublishStep::new(runner)),
        Box::new(CleanupStep),
    ]
}

/// Write a document as pretty JSON
pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Bare file name for messages
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ProcessRunner;
    use crate::config::NoShowConfig;

    #[test]
    fn test_pipeline_order() {
        let steps = build_pipeline(Arc::new(ProcessRunner::new()), Arc::new(NoShowConfig));
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "Fetch",
                "Transcode",
                "Transcribe",
                "Enhance",
                "Export",
                "Analyze",
                "Final export",
                "Publish",
                "Cleanup"
            ]
        );
    }
}
