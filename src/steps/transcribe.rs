//! Transcribe: speech-to-text over the transcoded audio.
//!
//! On resume the most capable existing transcript wins, even when the
//! configured model differs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::adapters::{CommandRunner, Invocation};
use crate::core::detector::{file_safe, transcript_file_name, transcript_name};
use crate::core::{ArtifactDetector, PipelineStep, ProgressSink, StepContext, StepResult};
use crate::domain::{PipelineStepKind, Transcript};

use super::file_label;

const NAME: &str = "Transcribe";

/// ASR models from most to least capable
pub const MODEL_PREFERENCE: &[&str] = &[
    "large-v3", "large-v2", "large", "medium.en", "medium", "small.en", "small", "base.en",
    "base", "tiny.en", "tiny",
];

/// Pick the most capable model; unknown models fall back to sorted order
pub fn select_model<'a, I>(available: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut models: Vec<&str> = available.into_iter().collect();
    models.sort_unstable();

    MODEL_PREFERENCE
        .iter()
        .find_map(|preferred| models.iter().copied().find(|m| m == preferred))
        .or_else(|| models.first().copied())
}

pub struct TranscribeStep {
    runner: Arc<dyn CommandRunner>,
}

impl TranscribeStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

fn adopt(ctx: &mut StepContext, transcript: Transcript, model: &str, path: PathBuf) {
    ctx.record_result("transcript", &path);
    ctx.transcript_model = Some(model.to_string());
    ctx.set_latest(
        transcript,
        transcript_name(PipelineStepKind::Transcribe, model),
        path,
    );
}

/// Existing transcripts keyed by model (legacy `transcript.json` keyed by
/// the model recorded inside it)
async fn existing_transcripts(dir: &Path, configured: &str) -> BTreeMap<String, PathBuf> {
    let legacy = dir.join("transcript.json");
    let legacy_model = if legacy.is_file() {
        Transcript::load(&legacy)
            .await
            .ok()
            .and_then(|t| t.asr_model)
            .unwrap_or_else(|| configured.to_string())
    } else {
        configured.to_string()
    };

    ArtifactDetector::new(dir).transcripts_by_model(PipelineStepKind::Transcribe, &legacy_model)
}

#[async_trait]
impl PipelineStep for TranscribeStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        vec![PipelineStepKind::Transcribe]
    }

    async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let requested = ctx.config.asr_model.clone();
        let available = existing_transcripts(&dir, &requested).await;

        let Some(key) = select_model(available.keys().map(String::as_str)) else {
            return Ok(None);
        };
        let key = key.to_string();
        let Some(path) = available.get(&key).cloned() else {
            return Ok(None);
        };

        let transcript = Transcript::load(&path).await?;

        // File names carry the file-safe form; recover the real model id
        let model = transcript
            .asr_model
            .clone()
            .filter(|m| file_safe(m) == key)
            .or_else(|| (file_safe(&requested) == key).then(|| requested.clone()))
            .unwrap_or_else(|| key.clone());

        if model != requested {
            info!(
                requested = %requested,
                selected = %model,
                available = ?available.keys().collect::<Vec<_>>(),
                "Reusing most capable existing transcript"
            );
        }

        let reason = format!("found {} (model {})", file_label(&path), model);
        adopt(ctx, transcript, &model, path);
        Ok(Some(reason))
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let audio = serde_json::to_value(ctx.require_audio(NAME)?)?;
        let model = ctx.config.asr_model.clone();

        let argv = Invocation::new(&ctx.config.commands.transcribe)
            .flag("--model", &model)
            .flag("--compute", &ctx.config.compute)
            .flag_opt("--asr-provider", ctx.config.asr_provider.as_ref())
            .into_argv();

        let doc = {
            let _ticker = progress.elapsed(&format!("Transcribing with {}", model));
            self.runner.invoke(&argv, Some(&audio), None).await?
        };

        let mut transcript = Transcript::from_value(doc)?;
        if transcript.asr_model.is_none() {
            transcript.asr_model = Some(model.clone());
        }
        if transcript.asr_provider.is_none() {
            transcript.asr_provider = ctx.config.asr_provider.clone();
        }

        let path = dir.join(transcript_file_name(PipelineStepKind::Transcribe, &model));
        transcript.save(&path).await?;

        let segments = transcript.segments.len();
        let audio_seconds = transcript.duration_seconds();
        adopt(ctx, transcript, &model, path.clone());

        Ok(StepResult::ok(format!(
            "Transcribed {} segments with {}",
            segments, model
        ))
        .with("transcript", path.display().to_string())
        .with("segments", segments)
        .with("audio_seconds", audio_seconds))
    }
}
