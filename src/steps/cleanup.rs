//! Cleanup: remove intermediate artifacts once the run is done.
//!
//! Keeps the transcript the latest pointer came from, `latest.json`, the
//! summary and the original download. Removed stages will run again on the
//! next invocation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::core::{ArtifactDetector, PipelineStep, ProgressSink, StepContext, StepResult};
use crate::domain::PipelineStepKind;

use super::file_label;

const NAME: &str = "Cleanup";

pub struct CleanupStep;

/// Files cleanup would remove for the current context
pub fn cleanup_targets(ctx: &StepContext, dir: &Path) -> Vec<PathBuf> {
    let detector = ArtifactDetector::new(dir);
    let keep = ctx.latest_transcript_path.as_deref();

    let mut targets: Vec<PathBuf> = PipelineStepKind::ALL
        .into_iter()
        .filter(PipelineStepKind::is_transcript)
        .flat_map(|kind| detector.files(kind))
        .filter(|path| Some(path.as_path()) != keep)
        .collect();

    if !ctx.config.keep_audio {
        if let Some(ref audio) = ctx.transcoded_audio {
            if Some(audio) != ctx.original_audio.as_ref() && audio.is_file() {
                targets.push(audio.clone());
            }
        }
    }

    targets.sort();
    targets.dedup();
    targets
}

#[async_trait]
impl PipelineStep for CleanupStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        Vec::new()
    }

    fn is_enabled(&self, ctx: &StepContext) -> bool {
        ctx.config.clean
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        _progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let targets = cleanup_targets(ctx, &dir);

        let mut removed = Vec::new();
        for path in &targets {
            debug!(path = %path.display(), "Removing intermediate file");
            tokio::fs::remove_file(path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            removed.push(file_label(path));
        }

        Ok(StepResult::ok(format!("Removed {} intermediate files", removed.len()))
            .with("removed", removed))
    }
}
