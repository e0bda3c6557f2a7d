//! Publish: push the analysis to a Notion database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::{CommandRunner, Invocation};
use crate::core::detector::{EPISODE_META_FILE, PUBLISH_RECEIPT_FILE};
use crate::core::{ArtifactDetector, PipelineStep, ProgressSink, StepContext, StepError, StepResult};
use crate::domain::PipelineStepKind;

use super::analyze::analysis_paths;

const NAME: &str = "Publish";

pub struct PublishStep {
    runner: Arc<dyn CommandRunner>,
}

impl PublishStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

/// Page URL reported by the publisher, if any
fn page_url(receipt: &Value) -> Option<&str> {
    ["url", "page_url"]
        .iter()
        .find_map(|key| receipt.get(*key).and_then(Value::as_str))
}

fn record(ctx: &mut StepContext, receipt_path: &Path, receipt: &Value) {
    ctx.record_result("notion_receipt", receipt_path);
    if let Some(url) = page_url(receipt) {
        ctx.results
            .insert("notion_url".to_string(), url.to_string());
    }
}

/// Analysis document to publish: this run's model first, then any JSON analysis
fn analysis_input(dir: &Path, model: &str) -> Option<PathBuf> {
    let (preferred, _) = analysis_paths(dir, model);
    if preferred.is_file() {
        return Some(preferred);
    }
    ArtifactDetector::new(dir)
        .files(PipelineStepKind::Analyze)
        .into_iter()
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
}

#[async_trait]
impl PipelineStep for PublishStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        vec![PipelineStepKind::Publish]
    }

    fn is_enabled(&self, ctx: &StepContext) -> bool {
        ctx.config.notion
    }

    async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
        let path = ctx.require_working_dir(NAME)?.join(PUBLISH_RECEIPT_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let receipt = serde_json::from_str(&content).unwrap_or(Value::Null);
        record(ctx, &path, &receipt);
        Ok(Some(format!("found {}", PUBLISH_RECEIPT_FILE)))
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let db = ctx
            .config
            .notion_db
            .clone()
            .filter(|db| !db.trim().is_empty())
            .ok_or_else(|| StepError::validation(NAME, "no Notion database id configured"))?;
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let input = analysis_input(&dir, &ctx.config.deepcast_model)
            .ok_or_else(|| StepError::missing(NAME, "analysis output"))?;
        let receipt_path = dir.join(PUBLISH_RECEIPT_FILE);

        let argv = Invocation::new(&ctx.config.commands.notion)
            .flag("--db", &db)
            .flag("--input", input.display())
            .flag("--meta", dir.join(EPISODE_META_FILE).display())
            .into_argv();

        progress.message("Publishing to Notion");
        let receipt = self
            .runner
            .invoke(&argv, None, Some(&receipt_path))
            .await?;

        record(ctx, &receipt_path, &receipt);
        let mut result = StepResult::ok("Published to Notion")
            .with("receipt", receipt_path.display().to_string());
        if let Some(url) = page_url(&receipt) {
            result = result.with("url", url);
        }
        Ok(result)
    }
}
