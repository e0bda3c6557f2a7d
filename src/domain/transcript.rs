//! Transcript documents exchanged between pipeline stages.
//!
//! Every stage either creates a transcript from audio or consumes one and
//! emits a refined one. Provenance fields a stage does not understand are
//! kept in `extra` so they survive the round trip untouched.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A segmented, timestamped transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Audio the transcript was produced from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,

    /// Detected or requested language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// ASR model identifier (e.g. "large-v3")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asr_model: Option<String>,

    /// ASR provider/backend identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asr_provider: Option<String>,

    /// Logical name of the transcript this one was refined from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,

    /// Time-bounded segments (not guaranteed strictly ordered)
    #[serde(default)]
    pub segments: Vec<Segment>,

    /// Provenance fields added by other stages
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transcript {
    /// Create a transcript from segments only
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            ..Default::default()
        }
    }

    /// Parse a transcript from a JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Document is not a transcript")
    }

    /// Load a transcript from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse transcript: {}", path.display()))
    }

    /// Write the transcript to disk as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize transcript")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write transcript: {}", path.display()))
    }

    /// Convert to a JSON value (for stdin of external operations)
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("Failed to serialize transcript")
    }

    /// End time of the last-ending segment
    pub fn duration_seconds(&self) -> f64 {
        self.segments.iter().map(|s| s.end).fold(0.0, f64::max)
    }

    /// Mark a boolean provenance flag (e.g. "preprocessed")
    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.extra.insert(key.to_string(), Value::Bool(value));
    }
}

/// A single time-bounded piece of text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Spoken text
    pub text: String,

    /// Speaker label (present after diarization)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    /// Word-level timings (present after alignment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl Segment {
    /// Create an unlabeled segment
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
            words: None,
        }
    }

    /// Attach a speaker label
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Segment length in seconds (never negative)
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Word-level timing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}
