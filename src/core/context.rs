//! Shared state threaded through a run.
//!
//! The orchestrator owns the context for the whole run and lends it to one
//! step at a time. Field ownership:
//! - Fetch: `working_dir`, `episode`, `config` (show overrides, once)
//! - Transcode: `audio`, `original_audio`, `transcoded_audio`
//! - Transcribe / Enhancement: the `latest_transcript*` fields, `transcript_model`
//! - every step: `results`, `warnings`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::domain::{AudioMeta, EpisodeMeta, Transcript};

use super::step::StepError;

/// Mutable record shared by all steps of one run
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub config: PipelineConfig,

    /// Unknown until Fetch runs when no workdir/show+date is configured
    pub working_dir: Option<PathBuf>,

    pub episode: Option<EpisodeMeta>,
    pub audio: Option<AudioMeta>,

    /// Accumulated metadata (e.g. `show_overrides`)
    pub metadata: Map<String, Value>,

    /// Paths and URLs produced, keyed by result name
    pub results: BTreeMap<String, String>,

    pub latest_transcript: Option<Transcript>,
    /// Logical name, e.g. `transcript-diarized-large-v3`
    pub latest_transcript_name: Option<String>,
    pub latest_transcript_path: Option<PathBuf>,
    /// ASR model the latest transcript descends from
    pub transcript_model: Option<String>,

    /// Audio as downloaded (never removed by cleanup)
    pub original_audio: Option<PathBuf>,
    /// Audio produced by transcode (removable by cleanup)
    pub transcoded_audio: Option<PathBuf>,

    pub warnings: Vec<String>,
}

impl StepContext {
    pub fn new(config: PipelineConfig) -> Self {
        let working_dir = config.planned_workdir();
        Self {
            config,
            working_dir,
            ..Default::default()
        }
    }

    pub fn require_working_dir(&self, step: &str) -> Result<&Path, StepError> {
        self.working_dir
            .as_deref()
            .ok_or_else(|| StepError::missing(step, "working directory"))
    }

    pub fn require_episode(&self, step: &str) -> Result<&EpisodeMeta, StepError> {
        self.episode
            .as_ref()
            .ok_or_else(|| StepError::missing(step, "episode metadata"))
    }

    pub fn require_audio(&self, step: &str) -> Result<&AudioMeta, StepError> {
        self.audio
            .as_ref()
            .ok_or_else(|| StepError::missing(step, "audio metadata"))
    }

    pub fn require_transcript(&self, step: &str) -> Result<&Transcript, StepError> {
        self.latest_transcript
            .as_ref()
            .ok_or_else(|| StepError::missing(step, "transcript"))
    }

    /// Point the latest transcript at a new document
    pub fn set_latest(&mut self, transcript: Transcript, name: impl Into<String>, path: PathBuf) {
        self.latest_transcript = Some(transcript);
        self.latest_transcript_name = Some(name.into());
        self.latest_transcript_path = Some(path);
    }

    pub fn record_result(&mut self, key: impl Into<String>, value: impl AsRef<Path>) {
        self.results
            .insert(key.into(), value.as_ref().display().to_string());
    }
}
