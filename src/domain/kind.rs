//! Logical pipeline stages.
//!
//! A kind names *what* was produced, not *which step* produced it: the
//! enhancement step, for instance, satisfies both `Preprocess` and `Diarize`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical stage of the pipeline, used for artifact classification and run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStepKind {
    /// Episode metadata (and source audio) obtained
    Fetch,

    /// Audio converted to the ASR input format
    Transcode,

    /// Raw transcript produced
    Transcribe,

    /// Word-level alignment applied
    Align,

    /// Speaker labels attached
    Diarize,

    /// Segments merged, normalized and restored
    Preprocess,

    /// AI analysis (deepcast) produced
    Analyze,

    /// Analysis published to the destination
    Publish,
}

impl PipelineStepKind {
    /// All kinds in pipeline order
    pub const ALL: [PipelineStepKind; 8] = [
        PipelineStepKind::Fetch,
        PipelineStepKind::Transcode,
        PipelineStepKind::Transcribe,
        PipelineStepKind::Align,
        PipelineStepKind::Diarize,
        PipelineStepKind::Preprocess,
        PipelineStepKind::Analyze,
        PipelineStepKind::Publish,
    ];

    /// Stable identifier used in the run-state file
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStepKind::Fetch => "fetch",
            PipelineStepKind::Transcode => "transcode",
            PipelineStepKind::Transcribe => "transcribe",
            PipelineStepKind::Align => "align",
            PipelineStepKind::Diarize => "diarize",
            PipelineStepKind::Preprocess => "preprocess",
            PipelineStepKind::Analyze => "analyze",
            PipelineStepKind::Publish => "publish",
        }
    }

    /// Whether artifacts of this kind are transcript documents
    pub fn is_transcript(&self) -> bool {
        matches!(
            self,
            PipelineStepKind::Transcribe
                | PipelineStepKind::Align
                | PipelineStepKind::Diarize
                | PipelineStepKind::Preprocess
        )
    }
}

impl fmt::Display for PipelineStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStepKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        PipelineStepKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown step kind: {}", s))
    }
}
