//! Export: publish the latest transcript inside the working directory.
//!
//! Runs twice: once after enhancement (`latest.json` plus any configured
//! formats) and once at the end, when it also writes `episode-summary.json`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::adapters::{CommandRunner, Invocation};
use crate::core::detector::{LATEST_FILE, SUMMARY_FILE};
use crate::core::{PipelineStep, ProgressSink, StepContext, StepResult};
use crate::domain::PipelineStepKind;

use super::write_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Intermediate,
    Final,
}

pub struct ExportStep {
    runner: Arc<dyn CommandRunner>,
    stage: ExportStage,
}

impl ExportStep {
    pub fn new(runner: Arc<dyn CommandRunner>, stage: ExportStage) -> Self {
        Self { runner, stage }
    }
}

#[async_trait]
impl PipelineStep for ExportStep {
    fn name(&self) -> &str {
        match self.stage {
            ExportStage::Intermediate => "Export",
            ExportStage::Final => "Final export",
        }
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        Vec::new()
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        _progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let name = self.name().to_string();
        let dir = ctx.require_working_dir(&name)?.to_path_buf();
        let transcript = ctx.require_transcript(&name)?.to_value()?;
        let latest_name = ctx
            .latest_transcript_name
            .clone()
            .unwrap_or_else(|| "transcript".to_string());

        let latest_path = dir.join(LATEST_FILE);
        write_json(&latest_path, &transcript).await?;
        ctx.record_result("latest", &latest_path);

        let mut result = StepResult::ok(format!("Wrote {} from {}", LATEST_FILE, latest_name))
            .with("latest", latest_path.display().to_string());

        let formats = ctx.config.export_formats.clone();
        if self.stage == ExportStage::Intermediate && !formats.is_empty() {
            let argv = Invocation::new(&ctx.config.commands.export)
                .flag("--formats", formats.join(","))
                .flag("--output-dir", dir.display())
                .flag("--basename", &latest_name)
                .into_argv();
            let doc = self.runner.invoke(&argv, Some(&transcript), None).await?;

            // Tools report written files as {"files": {"srt": "/path", ...}}
            if let Some(files) = doc.get("files").and_then(|f| f.as_object()) {
                for (format, path) in files {
                    if let Some(path) = path.as_str() {
                        ctx.record_result(format!("export_{}", format), path);
                    }
                }
            }
            result = result.with("formats", formats.join(","));
        }

        if self.stage == ExportStage::Final {
            let summary_path = dir.join(SUMMARY_FILE);
            ctx.record_result("summary", &summary_path);
            let summary = json!({
                "episode": ctx.episode,
                "latest_transcript": latest_name,
                "transcript_model": ctx.transcript_model,
                "results": ctx.results,
                "warnings": ctx.warnings,
                "generated_at": Utc::now().to_rfc3339(),
            });
            write_json(&summary_path, &summary).await?;
            result = result.with("summary", summary_path.display().to_string());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ProcessRunner;
    use crate::config::PipelineConfig;
    use crate::core::SilentProgress;
    use crate::domain::{Segment, Transcript};
    use serde_json::Value;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_final_export_writes_summary() {
        let temp = TempDir::new().unwrap();
        let mut ctx = StepContext::new(PipelineConfig {
            workdir: Some(temp.path().to_path_buf()),
            ..Default::default()
        });
        ctx.set_latest(
            Transcript::from_segments(vec![Segment::new(0.0, 1.0, "hi")]),
            "transcript-diarized-base",
            temp.path().join("transcript-diarized-base.json"),
        );

        let step = ExportStep::new(Arc::new(ProcessRunner::new()), ExportStage::Final);
        step.execute(&mut ctx, &SilentProgress, false).await.unwrap();

        let latest: Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join(LATEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(latest["segments"][0]["text"], "hi");

        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["latest_transcript"], "transcript-diarized-base");
        assert!(summary["results"]["latest"].as_str().unwrap().ends_with(LATEST_FILE));
    }

    #[tokio::test]
    async fn test_export_requires_transcript() {
        let temp = TempDir::new().unwrap();
        let mut ctx = StepContext::new(PipelineConfig {
            workdir: Some(temp.path().to_path_buf()),
            ..Default::default()
        });
        let step = ExportStep::new(Arc::new(ProcessRunner::new()), ExportStage::Intermediate);
        assert!(step.execute(&mut ctx, &SilentProgress, false).await.is_err());
    }
}
