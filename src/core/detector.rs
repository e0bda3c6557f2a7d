//! Artifact detection for resumable runs.
//!
//! Each step kind owns an ordered list of glob patterns: current names first,
//! then names used by older versions of the tool. A kind is present when any
//! pattern matches a file. Matches from all patterns are unioned into a sorted
//! set, so a file matched twice is counted once. Legacy names are never a
//! separate code path, only more patterns.
//!
//! Detection has no side effects and is the single source of truth for
//! "has this step already run for this directory".

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;

use crate::domain::{EpisodeArtifacts, PipelineStepKind};

/// Run state file name
pub const RUN_STATE_FILE: &str = "run-state.json";
/// Latest transcript pointer
pub const LATEST_FILE: &str = "latest.json";
/// Aggregate summary written by the final export
pub const SUMMARY_FILE: &str = "episode-summary.json";
pub const EPISODE_META_FILE: &str = "episode-meta.json";
pub const AUDIO_META_FILE: &str = "audio-meta.json";
pub const PUBLISH_RECEIPT_FILE: &str = "notion.out.json";

/// A file-name pattern for one step kind
#[derive(Debug, Clone, Copy)]
pub struct ArtifactPattern {
    /// Glob over the file name
    pub glob: &'static str,

    /// File-name prefixes claimed by a more specific kind
    pub exclude_prefixes: &'static [&'static str],

    /// Name used by older versions of the tool
    pub legacy: bool,
}

impl ArtifactPattern {
    const fn current(glob: &'static str) -> Self {
        Self {
            glob,
            exclude_prefixes: &[],
            legacy: false,
        }
    }

    const fn legacy(glob: &'static str) -> Self {
        Self {
            glob,
            exclude_prefixes: &[],
            legacy: true,
        }
    }

    /// Whether a bare file name matches this pattern
    pub fn matches(&self, file_name: &str) -> bool {
        if self
            .exclude_prefixes
            .iter()
            .any(|prefix| file_name.starts_with(prefix))
        {
            return false;
        }
        Pattern::new(self.glob)
            .map(|p| p.matches(file_name))
            .unwrap_or(false)
    }
}

const STAGED_TRANSCRIPT_PREFIXES: &[&str] = &[
    "transcript-aligned-",
    "transcript-diarized-",
    "transcript-preprocessed-",
];

const FETCH_PATTERNS: &[ArtifactPattern] = &[ArtifactPattern::current(EPISODE_META_FILE)];

const TRANSCODE_PATTERNS: &[ArtifactPattern] = &[ArtifactPattern::current(AUDIO_META_FILE)];

const TRANSCRIBE_PATTERNS: &[ArtifactPattern] = &[
    ArtifactPattern {
        glob: "transcript-*.json",
        exclude_prefixes: STAGED_TRANSCRIPT_PREFIXES,
        legacy: false,
    },
    ArtifactPattern::legacy("transcript.json"),
];

const ALIGN_PATTERNS: &[ArtifactPattern] = &[
    ArtifactPattern::current("transcript-aligned-*.json"),
    ArtifactPattern::legacy("aligned-transcript.json"),
    ArtifactPattern::legacy("aligned-transcript-*.json"),
];

const DIARIZE_PATTERNS: &[ArtifactPattern] = &[
    ArtifactPattern::current("transcript-diarized-*.json"),
    ArtifactPattern::legacy("diarized-transcript.json"),
    ArtifactPattern::legacy("diarized-transcript-*.json"),
];

const PREPROCESS_PATTERNS: &[ArtifactPattern] =
    &[ArtifactPattern::current("transcript-preprocessed-*.json")];

const ANALYZE_PATTERNS: &[ArtifactPattern] = &[
    ArtifactPattern::current("deepcast-*.json"),
    ArtifactPattern::current("deepcast-*.md"),
    ArtifactPattern::legacy("deepcast.json"),
    ArtifactPattern::legacy("deepcast.md"),
];

const PUBLISH_PATTERNS: &[ArtifactPattern] = &[ArtifactPattern::current(PUBLISH_RECEIPT_FILE)];

/// Ordered patterns (current first, then legacy) for a kind
pub fn patterns_for(kind: PipelineStepKind) -> &'static [ArtifactPattern] {
    match kind {
        PipelineStepKind::Fetch => FETCH_PATTERNS,
        PipelineStepKind::Transcode => TRANSCODE_PATTERNS,
        PipelineStepKind::Transcribe => TRANSCRIBE_PATTERNS,
        PipelineStepKind::Align => ALIGN_PATTERNS,
        PipelineStepKind::Diarize => DIARIZE_PATTERNS,
        PipelineStepKind::Preprocess => PREPROCESS_PATTERNS,
        PipelineStepKind::Analyze => ANALYZE_PATTERNS,
        PipelineStepKind::Publish => PUBLISH_PATTERNS,
    }
}

/// Current file-name prefix of a transcript kind's artifacts
pub fn transcript_prefix(kind: PipelineStepKind) -> Option<&'static str> {
    match kind {
        PipelineStepKind::Transcribe => Some("transcript-"),
        PipelineStepKind::Align => Some("transcript-aligned-"),
        PipelineStepKind::Diarize => Some("transcript-diarized-"),
        PipelineStepKind::Preprocess => Some("transcript-preprocessed-"),
        _ => None,
    }
}

/// Model name made safe for use in a file name (`openai/whisper` → `openai_whisper`)
pub fn file_safe(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Logical name of a transcript artifact (`transcript-diarized-large`)
///
/// The model part is passed through [`file_safe`], so provider-style ids
/// never introduce path separators.
pub fn transcript_name(kind: PipelineStepKind, model: &str) -> String {
    let prefix = transcript_prefix(kind).unwrap_or("transcript-");
    format!("{}{}", prefix, file_safe(model))
}

/// File name of a transcript artifact (`transcript-diarized-large.json`)
pub fn transcript_file_name(kind: PipelineStepKind, model: &str) -> String {
    format!("{}.json", transcript_name(kind, model))
}

/// Model name encoded in a transcript file name, if any
///
/// Legacy un-suffixed names (`transcript.json`, `diarized-transcript.json`)
/// carry no model and return `None`.
pub fn model_from_file_name(kind: PipelineStepKind, file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".json")?;

    if kind == PipelineStepKind::Transcribe
        && STAGED_TRANSCRIPT_PREFIXES
            .iter()
            .any(|p| file_name.starts_with(p))
    {
        return None;
    }

    let legacy_prefix = match kind {
        PipelineStepKind::Align => Some("aligned-transcript-"),
        PipelineStepKind::Diarize => Some("diarized-transcript-"),
        _ => None,
    };

    transcript_prefix(kind)
        .into_iter()
        .chain(legacy_prefix)
        .find_map(|prefix| stem.strip_prefix(prefix))
        .filter(|model| !model.is_empty())
        .map(str::to_string)
}

/// Scans a working directory for pipeline artifacts
#[derive(Debug, Clone)]
pub struct ArtifactDetector {
    working_dir: PathBuf,
}

impl ArtifactDetector {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Sorted, deduplicated files matching any pattern of `kind`
    pub fn files(&self, kind: PipelineStepKind) -> BTreeSet<PathBuf> {
        matching_names(&self.file_names(), patterns_for(kind))
            .into_iter()
            .map(|name| self.working_dir.join(name))
            .collect()
    }

    /// Snapshot everything present in the directory
    pub fn detect(&self) -> EpisodeArtifacts {
        let first = |kind| self.files(kind).into_iter().next();

        EpisodeArtifacts {
            episode_meta: first(PipelineStepKind::Fetch),
            audio_meta: first(PipelineStepKind::Transcode),
            transcripts: self.files(PipelineStepKind::Transcribe),
            aligned: self.files(PipelineStepKind::Align),
            diarized: self.files(PipelineStepKind::Diarize),
            preprocessed: self.files(PipelineStepKind::Preprocess),
            analysis: self.files(PipelineStepKind::Analyze),
            publish_receipt: first(PipelineStepKind::Publish),
        }
    }

    /// Kinds with at least one artifact on disk
    pub fn completed_kinds(&self) -> BTreeSet<PipelineStepKind> {
        self.detect().completed_kinds()
    }

    /// Preferred artifact for a kind: first match of the earliest pattern
    /// (current names win over legacy ones)
    pub fn primary_artifact(&self, kind: PipelineStepKind) -> Option<PathBuf> {
        let names = self.file_names();
        patterns_for(kind).iter().find_map(|pattern| {
            names
                .iter()
                .find(|name| pattern.matches(name))
                .map(|name| self.working_dir.join(name))
        })
    }

    /// Transcripts of a kind keyed by file-safe model name
    ///
    /// Legacy files without a model suffix are keyed by `legacy_model`
    /// (typically read from the document itself by the caller) and never
    /// shadow a current file for the same model.
    pub fn transcripts_by_model(
        &self,
        kind: PipelineStepKind,
        legacy_model: &str,
    ) -> BTreeMap<String, PathBuf> {
        let mut by_model = BTreeMap::new();
        let mut legacy = Vec::new();

        for path in self.files(kind) {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match model_from_file_name(kind, name) {
                Some(model) => {
                    by_model.insert(model, path);
                }
                None => legacy.push(path),
            }
        }

        for path in legacy {
            by_model.entry(file_safe(legacy_model)).or_insert(path);
        }

        by_model
    }

    /// Path of a transcript artifact for `model`, if present
    pub fn transcript_for(&self, kind: PipelineStepKind, model: &str) -> Option<PathBuf> {
        let path = self.working_dir.join(transcript_file_name(kind, model));
        path.is_file().then_some(path)
    }

    /// Sorted regular-file names in the working directory
    fn file_names(&self) -> BTreeSet<String> {
        let entries = match std::fs::read_dir(&self.working_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.working_dir.display(), error = %e, "Working directory not readable");
                return BTreeSet::new();
            }
        };

        entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect()
    }
}

/// Names matched by any of `patterns`, each once
fn matching_names<'a>(
    names: &'a BTreeSet<String>,
    patterns: &[ArtifactPattern],
) -> BTreeSet<&'a str> {
    patterns
        .iter()
        .flat_map(|pattern| {
            names
                .iter()
                .filter(move |name| pattern.matches(name))
                .map(String::as_str)
        })
        .collect()
}

/// Snapshot a working directory
pub fn detect(working_dir: &Path) -> EpisodeArtifacts {
    ArtifactDetector::new(working_dir).detect()
}

/// Kinds already completed in a working directory
pub fn completed_kinds(working_dir: &Path) -> BTreeSet<PipelineStepKind> {
    ArtifactDetector::new(working_dir).completed_kinds()
}

/// Preferred artifact for a kind in a working directory
pub fn primary_artifact(working_dir: &Path, kind: PipelineStepKind) -> Option<PathBuf> {
    ArtifactDetector::new(working_dir).primary_artifact(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "{}").unwrap();
    }

    #[test]
    fn test_file_matched_by_two_patterns_counts_once() {
        let names: BTreeSet<String> = [
            "deepcast-gpt-4.1.json",
            "deepcast-claude.json",
            "notes.txt",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        let patterns = [
            ArtifactPattern::current("deepcast-*.json"),
            ArtifactPattern::legacy("deepcast-gpt*.json"),
        ];

        assert!(patterns.iter().all(|p| p.matches("deepcast-gpt-4.1.json")));
        assert_eq!(
            matching_names(&names, &patterns),
            BTreeSet::from(["deepcast-claude.json", "deepcast-gpt-4.1.json"])
        );
    }

    #[test]
    fn test_raw_transcript_excludes_staged_variants() {
        let pattern = &TRANSCRIBE_PATTERNS[0];
        assert!(pattern.matches("transcript-large-v3.json"));
        assert!(!pattern.matches("transcript-diarized-large-v3.json"));
        assert!(!pattern.matches("transcript-aligned-base.json"));
        assert!(!pattern.matches("transcript-preprocessed-base.json"));
    }

    #[test]
    fn test_model_from_file_name() {
        use PipelineStepKind::*;
        assert_eq!(
            model_from_file_name(Transcribe, "transcript-large-v3.json").as_deref(),
            Some("large-v3")
        );
        assert_eq!(model_from_file_name(Transcribe, "transcript.json"), None);
        assert_eq!(model_from_file_name(Transcribe, "transcript-diarized-base.json"), None);
        assert_eq!(
            model_from_file_name(Diarize, "diarized-transcript-small.json").as_deref(),
            Some("small")
        );
        assert_eq!(
            model_from_file_name(Diarize, "transcript-diarized-small.json").as_deref(),
            Some("small")
        );
        assert_eq!(model_from_file_name(Diarize, "diarized-transcript.json"), None);
    }

    #[test]
    fn test_provider_model_ids_are_file_safe() {
        use PipelineStepKind::*;
        assert_eq!(file_safe("gpt-4.1-mini"), "gpt-4.1-mini");
        assert_eq!(file_safe("openai/gpt 4o:latest"), "openai_gpt_4o_latest");

        let name = transcript_file_name(Diarize, "openai/whisper-large-v3");
        assert_eq!(name, "transcript-diarized-openai_whisper-large-v3.json");
        assert!(!name.contains('/'));
        assert_eq!(
            model_from_file_name(Diarize, &name).as_deref(),
            Some("openai_whisper-large-v3")
        );

        let temp = TempDir::new().unwrap();
        touch(temp.path(), "transcript.json");
        let by_model = ArtifactDetector::new(temp.path())
            .transcripts_by_model(Transcribe, "openai/whisper-large-v3");
        assert!(by_model.contains_key("openai_whisper-large-v3"));
    }

    #[test]
    fn test_primary_artifact_prefers_current_names() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "aligned-transcript.json");
        touch(temp.path(), "transcript-aligned-base.json");

        let primary = primary_artifact(temp.path(), PipelineStepKind::Align).unwrap();
        assert!(primary.ends_with("transcript-aligned-base.json"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let artifacts = detect(Path::new("/definitely/not/here/podx"));
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_legacy_transcript_does_not_shadow_current() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "transcript.json");
        touch(temp.path(), "transcript-base.json");

        let detector = ArtifactDetector::new(temp.path());
        let by_model = detector.transcripts_by_model(PipelineStepKind::Transcribe, "base");
        assert_eq!(by_model.len(), 1);
        assert!(by_model["base"].ends_with("transcript-base.json"));
    }
}
