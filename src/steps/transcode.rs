//! Transcode: convert the downloaded audio to the ASR input format.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::adapters::{CommandRunner, Invocation};
use crate::core::detector::AUDIO_META_FILE;
use crate::core::{PipelineStep, ProgressSink, StepContext, StepResult};
use crate::domain::{AudioMeta, PipelineStepKind};

const NAME: &str = "Transcode";

pub struct TranscodeStep {
    runner: Arc<dyn CommandRunner>,
}

impl TranscodeStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

fn adopt(ctx: &mut StepContext, audio: AudioMeta, meta_path: &Path) {
    let transcoded = PathBuf::from(&audio.audio_path);
    if ctx.original_audio.is_none() {
        ctx.original_audio = ctx
            .episode
            .as_ref()
            .and_then(|e| e.audio_path.as_deref())
            .map(PathBuf::from);
    }
    ctx.record_result("audio_meta", meta_path);
    ctx.record_result("audio", &transcoded);
    ctx.transcoded_audio = Some(transcoded);
    ctx.audio = Some(audio);
}

#[async_trait]
impl PipelineStep for TranscodeStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        vec![PipelineStepKind::Transcode]
    }

    async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
        let path = ctx.require_working_dir(NAME)?.join(AUDIO_META_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let audio = AudioMeta::load(&path).await?;
        adopt(ctx, audio, &path);
        Ok(Some(format!("found {}", AUDIO_META_FILE)))
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let episode = serde_json::to_value(ctx.require_episode(NAME)?)?;

        let argv = Invocation::new(&ctx.config.commands.transcode)
            .flag("--to", &ctx.config.fmt)
            .flag("--outdir", dir.display())
            .into_argv();

        let doc = {
            let _ticker = progress.elapsed("Transcoding audio");
            self.runner.invoke(&argv, Some(&episode), None).await?
        };

        let audio = AudioMeta::from_value(doc)?;
        let path = dir.join(AUDIO_META_FILE);
        audio.save(&path).await?;

        let message = format!("Transcoded to {} ({})", ctx.config.fmt, audio.audio_path);
        let audio_path = audio.audio_path.clone();
        adopt(ctx, audio, &path);

        Ok(StepResult::ok(message)
            .with("audio_meta", path.display().to_string())
            .with("audio_path", audio_path))
    }
}
