//! Analyze: AI analysis (deepcast) of the latest transcript.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::adapters::{CommandRunner, Invocation};
use crate::core::{PipelineStep, ProgressSink, StepContext, StepResult};
use crate::domain::PipelineStepKind;

use super::{file_label, file_safe};

const NAME: &str = "Analyze";

/// `deepcast-<model>.json` and `deepcast-<model>.md` for an analysis model
pub fn analysis_paths(dir: &Path, model: &str) -> (PathBuf, PathBuf) {
    let stem = format!("deepcast-{}", file_safe(model));
    (
        dir.join(format!("{}.json", stem)),
        dir.join(format!("{}.md", stem)),
    )
}

pub struct AnalyzeStep {
    runner: Arc<dyn CommandRunner>,
}

impl AnalyzeStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

fn record(ctx: &mut StepContext, json_path: &Path, md_path: &Path) {
    ctx.record_result("deepcast", json_path);
    if md_path.is_file() {
        ctx.record_result("deepcast_md", md_path);
    }
}

#[async_trait]
impl PipelineStep for AnalyzeStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        vec![PipelineStepKind::Analyze]
    }

    fn is_enabled(&self, ctx: &StepContext) -> bool {
        ctx.config.deepcast
    }

    async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
        let dir = ctx.require_working_dir(NAME)?;
        let (json_path, md_path) = analysis_paths(dir, &ctx.config.deepcast_model);
        if !json_path.is_file() {
            return Ok(None);
        }

        record(ctx, &json_path, &md_path);
        Ok(Some(format!("found {}", file_label(&json_path))))
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let transcript = ctx.require_transcript(NAME)?.to_value()?;
        let model = ctx.config.deepcast_model.clone();
        let (json_path, md_path) = analysis_paths(&dir, &model);

        let argv = Invocation::new(&ctx.config.commands.deepcast)
            .flag("--model", &model)
            .flag_opt("--type", ctx.config.deepcast_type.as_ref())
            .flag("--output-md", md_path.display())
            .into_argv();

        {
            let _ticker = progress.elapsed(&format!("Analyzing with {}", model));
            self.runner
                .invoke(&argv, Some(&transcript), Some(&json_path))
                .await?;
        }

        record(ctx, &json_path, &md_path);
        Ok(StepResult::ok(format!("Analysis written to {}", file_label(&json_path)))
            .with("deepcast", json_path.display().to_string())
            .with("model", model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_paths() {
        let (json, md) = analysis_paths(Path::new("/ep"), "gpt-4.1-mini");
        assert_eq!(json, PathBuf::from("/ep/deepcast-gpt-4.1-mini.json"));
        assert_eq!(md, PathBuf::from("/ep/deepcast-gpt-4.1-mini.md"));

        let (json, _) = analysis_paths(Path::new("/ep"), "anthropic/claude");
        assert_eq!(json, PathBuf::from("/ep/deepcast-anthropic_claude.json"));
    }
}
