//! Snapshot of the artifacts present in a working directory.
//!
//! Artifacts are both step outputs and evidence that a step already ran.
//! The snapshot is derived by scanning and is never persisted.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

use super::kind::PipelineStepKind;

/// What exists in a working directory at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EpisodeArtifacts {
    /// `episode-meta.json`
    pub episode_meta: Option<PathBuf>,

    /// `audio-meta.json`
    pub audio_meta: Option<PathBuf>,

    /// Raw ASR transcripts (current and legacy names)
    pub transcripts: BTreeSet<PathBuf>,

    /// Alignment outputs
    pub aligned: BTreeSet<PathBuf>,

    /// Diarization outputs
    pub diarized: BTreeSet<PathBuf>,

    /// Preprocessing outputs
    pub preprocessed: BTreeSet<PathBuf>,

    /// Analysis outputs (json/markdown pairs)
    pub analysis: BTreeSet<PathBuf>,

    /// Publish receipt
    pub publish_receipt: Option<PathBuf>,
}

impl EpisodeArtifacts {
    /// All files classified under a kind, sorted
    pub fn files(&self, kind: PipelineStepKind) -> Vec<PathBuf> {
        match kind {
            PipelineStepKind::Fetch => self.episode_meta.iter().cloned().collect(),
            PipelineStepKind::Transcode => self.audio_meta.iter().cloned().collect(),
            PipelineStepKind::Transcribe => self.transcripts.iter().cloned().collect(),
            PipelineStepKind::Align => self.aligned.iter().cloned().collect(),
            PipelineStepKind::Diarize => self.diarized.iter().cloned().collect(),
            PipelineStepKind::Preprocess => self.preprocessed.iter().cloned().collect(),
            PipelineStepKind::Analyze => self.analysis.iter().cloned().collect(),
            PipelineStepKind::Publish => self.publish_receipt.iter().cloned().collect(),
        }
    }

    /// Whether any artifact of this kind exists
    pub fn has(&self, kind: PipelineStepKind) -> bool {
        !self.files(kind).is_empty()
    }

    /// Kinds with at least one artifact
    pub fn completed_kinds(&self) -> BTreeSet<PipelineStepKind> {
        PipelineStepKind::ALL
            .iter()
            .copied()
            .filter(|k| self.has(*k))
            .collect()
    }

    /// Whether the directory holds nothing the pipeline recognises
    pub fn is_empty(&self) -> bool {
        self.completed_kinds().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let artifacts = EpisodeArtifacts::default();
        assert!(artifacts.is_empty());
        assert!(!artifacts.has(PipelineStepKind::Fetch));
    }

    #[test]
    fn test_completed_kinds_follow_files() {
        let mut artifacts = EpisodeArtifacts {
            episode_meta: Some(PathBuf::from("/w/episode-meta.json")),
            ..Default::default()
        };
        artifacts
            .diarized
            .insert(PathBuf::from("/w/transcript-diarized-base.json"));

        let kinds = artifacts.completed_kinds();
        assert_eq!(
            kinds.into_iter().collect::<Vec<_>>(),
            vec![PipelineStepKind::Fetch, PipelineStepKind::Diarize]
        );
    }
}
