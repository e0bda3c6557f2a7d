//! Enhance: preprocess, align and diarize the latest transcript.
//!
//! Sub-stages run in that order and are enabled independently. A sub-stage
//! whose artifact already exists is loaded instead of run, and its output
//! becomes the latest transcript before the next sub-stage starts.
//!
//! Every output records the transcript it was derived from. An artifact is
//! only reused when it was derived from the current input, and once a
//! sub-stage has run, every later sub-stage runs too.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::{CommandRunner, CommandTextModel, Invocation, TextModel};
use crate::config::PipelineConfig;
use crate::core::detector::{file_safe, transcript_file_name, transcript_name};
use crate::core::{
    ArtifactDetector, PipelineStep, ProgressSink, StepContext, StepError, StepResult,
};
use crate::domain::{PipelineStepKind, Transcript};
use crate::transform::preprocess;

use super::file_label;

const NAME: &str = "Enhance";

const SUB_STAGES: [PipelineStepKind; 3] = [
    PipelineStepKind::Preprocess,
    PipelineStepKind::Align,
    PipelineStepKind::Diarize,
];

fn stage_enabled(kind: PipelineStepKind, config: &PipelineConfig) -> bool {
    match kind {
        PipelineStepKind::Preprocess => config.preprocess,
        PipelineStepKind::Align => config.align,
        PipelineStepKind::Diarize => config.diarize,
        _ => false,
    }
}

fn enabled_stages(config: &PipelineConfig) -> Vec<PipelineStepKind> {
    SUB_STAGES
        .into_iter()
        .filter(|kind| stage_enabled(*kind, config))
        .collect()
}

/// Existing artifact of a sub-stage for `model` (legacy names included)
fn existing_artifact(dir: &Path, kind: PipelineStepKind, model: &str) -> Option<PathBuf> {
    ArtifactDetector::new(dir)
        .transcripts_by_model(kind, model)
        .remove(&file_safe(model))
}

/// Existing artifact of a sub-stage that was derived from `input`
///
/// Outputs without provenance (older runs) are accepted.
async fn reusable_artifact(
    dir: &Path,
    kind: PipelineStepKind,
    model: &str,
    input: &str,
) -> Result<Option<(PathBuf, Transcript)>> {
    let Some(path) = existing_artifact(dir, kind, model) else {
        return Ok(None);
    };
    let transcript = Transcript::load(&path).await?;

    match transcript.derived_from.as_deref() {
        Some(source) if source != input => {
            debug!(
                stage = %kind,
                path = %path.display(),
                recorded = %source,
                expected = %input,
                "Sub-stage output derived from another transcript, rerunning"
            );
            Ok(None)
        }
        _ => Ok(Some((path, transcript))),
    }
}

/// Logical name of the transcript enhancement starts from
fn initial_input(ctx: &StepContext, model: &str) -> String {
    ctx.latest_transcript_name
        .clone()
        .unwrap_or_else(|| transcript_name(PipelineStepKind::Transcribe, model))
}

fn result_key(kind: PipelineStepKind) -> String {
    format!("transcript_{}", kind.as_str())
}

pub struct EnhanceStep {
    runner: Arc<dyn CommandRunner>,
}

impl EnhanceStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run one sub-stage over the latest transcript
    async fn run_stage(
        &self,
        kind: PipelineStepKind,
        ctx: &StepContext,
        progress: &dyn ProgressSink,
    ) -> Result<(Transcript, Vec<String>)> {
        let input = ctx.require_transcript(NAME)?;
        let commands = &ctx.config.commands;

        let mut output = match kind {
            PipelineStepKind::Preprocess => {
                let options = &ctx.config.preprocess_options;
                let model = options.needs_model().then(|| {
                    CommandTextModel::new(
                        Arc::clone(&self.runner),
                        commands.llm.clone(),
                        ctx.config.llm_model.clone(),
                    )
                });
                let outcome = preprocess(
                    input,
                    options,
                    model.as_ref().map(|m| m as &dyn TextModel),
                )
                .await?;
                if outcome.ads_removed > 0 {
                    info!(removed = outcome.ads_removed, "Dropped ad segments");
                }
                return Ok((outcome.transcript, outcome.warnings));
            }
            PipelineStepKind::Align => {
                let argv = Invocation::new(&commands.align).into_argv();
                let _ticker = progress.elapsed("Aligning words");
                let doc = self.runner.invoke(&argv, Some(&input.to_value()?), None).await?;
                Transcript::from_value(doc)?
            }
            PipelineStepKind::Diarize => {
                let audio = ctx
                    .audio
                    .as_ref()
                    .map(|a| PathBuf::from(&a.audio_path))
                    .or_else(|| ctx.transcoded_audio.clone())
                    .ok_or_else(|| StepError::missing(NAME, "audio for diarization"))?;
                let argv = Invocation::new(&commands.diarize)
                    .flag("--audio", audio.display())
                    .into_argv();
                let _ticker = progress.elapsed("Identifying speakers");
                let doc = self.runner.invoke(&argv, Some(&input.to_value()?), None).await?;
                Transcript::from_value(doc)?
            }
            other => anyhow::bail!("{} is not an enhancement stage", other),
        };

        // Provenance survives tools that drop it
        if output.asr_model.is_none() {
            output.asr_model = input.asr_model.clone();
        }
        if output.asr_provider.is_none() {
            output.asr_provider = input.asr_provider.clone();
        }
        if output.audio_path.is_none() {
            output.audio_path = input.audio_path.clone();
        }
        Ok((output, Vec::new()))
    }
}

#[async_trait]
impl PipelineStep for EnhanceStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, ctx: &StepContext) -> Vec<PipelineStepKind> {
        enabled_stages(&ctx.config)
    }

    fn is_enabled(&self, ctx: &StepContext) -> bool {
        ctx.config.enhancement_enabled()
    }

    async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let model = ctx
            .transcript_model
            .clone()
            .unwrap_or_else(|| ctx.config.asr_model.clone());

        let mut input = initial_input(ctx, &model);
        let mut found = Vec::new();
        for kind in enabled_stages(&ctx.config) {
            match reusable_artifact(&dir, kind, &model, &input).await? {
                Some((path, transcript)) => {
                    input = transcript_name(kind, &model);
                    found.push((kind, path, transcript));
                }
                None => return Ok(None),
            }
        }

        for (kind, path, _) in &found {
            ctx.record_result(result_key(*kind), path);
        }
        let names: Vec<String> = found.iter().map(|(_, p, _)| file_label(p)).collect();

        let Some((last_kind, last_path, transcript)) = found.pop() else {
            return Ok(None);
        };
        ctx.set_latest(transcript, transcript_name(last_kind, &model), last_path);

        Ok(Some(format!("found {}", names.join(", "))))
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let dir = ctx.require_working_dir(NAME)?.to_path_buf();
        let model = ctx
            .transcript_model
            .clone()
            .unwrap_or_else(|| ctx.config.asr_model.clone());

        let mut input = initial_input(ctx, &model);
        let mut ran = Vec::new();
        let mut reused = Vec::new();
        let mut warnings = Vec::new();

        for kind in enabled_stages(&ctx.config) {
            // Downstream output of an earlier chain is stale once anything upstream ran
            let existing = if ran.is_empty() {
                reusable_artifact(&dir, kind, &model, &input).await?
            } else {
                None
            };

            let (transcript, path) = match existing {
                Some((path, transcript)) => {
                    debug!(stage = %kind, path = %path.display(), "Reusing sub-stage output");
                    reused.push(kind.as_str());
                    (transcript, path)
                }
                None => {
                    progress.message(&format!("Running {}", kind));
                    let (mut transcript, stage_warnings) =
                        self.run_stage(kind, ctx, progress).await?;
                    transcript.derived_from = Some(input.clone());
                    let path = dir.join(transcript_file_name(kind, &model));
                    transcript.save(&path).await?;
                    warnings.extend(stage_warnings);
                    ran.push(kind.as_str());
                    (transcript, path)
                }
            };

            ctx.record_result(result_key(kind), &path);
            ctx.set_latest(transcript, transcript_name(kind, &model), path);
            input = transcript_name(kind, &model);
        }

        let mut message = format!("Ran {}", ran.join(", "));
        if !reused.is_empty() {
            message.push_str(&format!("; reused {}", reused.join(", ")));
        }

        let latest = ctx.latest_transcript_name.clone().unwrap_or_default();
        Ok(StepResult::ok(message)
            .with("latest", latest)
            .with_warnings(warnings))
    }
}
