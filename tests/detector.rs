//! Artifact detection and run-state persistence on real directories.

use std::collections::BTreeSet;

use serde_json::json;
use tempfile::TempDir;

use podx::core::detector::{self, ArtifactDetector, RUN_STATE_FILE};
use podx::core::RunState;
use podx::PipelineStepKind;

fn touch(temp: &TempDir, names: &[&str]) {
    for name in names {
        std::fs::write(temp.path().join(name), "{}").unwrap();
    }
}

#[test]
fn test_detection_is_deterministic() {
    let temp = TempDir::new().unwrap();
    touch(
        &temp,
        &[
            "episode-meta.json",
            "audio-meta.json",
            "transcript-base.json",
            "transcript-diarized-base.json",
            "deepcast-gpt-4.1-mini.json",
            "deepcast-gpt-4.1-mini.md",
            "notes.txt",
        ],
    );

    let first = detector::detect(temp.path());
    let second = detector::detect(temp.path());
    assert_eq!(first, second);

    assert_eq!(first.analysis.len(), 2);
    assert_eq!(
        detector::completed_kinds(temp.path()),
        BTreeSet::from([
            PipelineStepKind::Fetch,
            PipelineStepKind::Transcode,
            PipelineStepKind::Transcribe,
            PipelineStepKind::Diarize,
            PipelineStepKind::Analyze,
        ])
    );
}

#[test]
fn test_staged_transcripts_are_not_raw_transcripts() {
    let temp = TempDir::new().unwrap();
    touch(
        &temp,
        &[
            "transcript-aligned-large.json",
            "transcript-preprocessed-large.json",
        ],
    );

    let detector = ArtifactDetector::new(temp.path());
    assert!(detector.files(PipelineStepKind::Transcribe).is_empty());
    assert_eq!(detector.files(PipelineStepKind::Align).len(), 1);
    assert_eq!(detector.files(PipelineStepKind::Preprocess).len(), 1);
}

#[test]
fn test_legacy_names_count_once() {
    let temp = TempDir::new().unwrap();
    touch(
        &temp,
        &[
            "diarized-transcript.json",
            "diarized-transcript-base.json",
            "transcript-diarized-large.json",
            "transcript.json",
        ],
    );

    let detector = ArtifactDetector::new(temp.path());
    assert_eq!(detector.files(PipelineStepKind::Diarize).len(), 3);
    assert_eq!(
        detector.primary_artifact(PipelineStepKind::Diarize),
        Some(temp.path().join("transcript-diarized-large.json"))
    );

    let by_model = detector.transcripts_by_model(PipelineStepKind::Diarize, "medium");
    assert_eq!(
        by_model.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["base", "large", "medium"]
    );

    let raw = detector.transcripts_by_model(PipelineStepKind::Transcribe, "small");
    assert_eq!(raw.get("small"), Some(&temp.path().join("transcript.json")));
}

#[test]
fn test_missing_directory_is_empty() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");
    assert!(detector::detect(&missing).is_empty());
    assert!(detector::primary_artifact(&missing, PipelineStepKind::Fetch).is_none());
}

#[test]
fn test_run_state_round_trip() {
    let temp = TempDir::new().unwrap();
    let mut state = RunState::new(temp.path());
    state.mark_completed(PipelineStepKind::Fetch);
    state.mark_completed(PipelineStepKind::Diarize);
    state.set_metadata("last_error", json!({"step": "Analyze", "error": "timeout"}));
    state.save().unwrap();

    let loaded = RunState::load(temp.path()).unwrap();
    assert_eq!(loaded, state);

    // Only the state file is left behind
    let names: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![RUN_STATE_FILE.to_string()]);
}

#[test]
fn test_corrupt_state_recovers_from_artifacts() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(RUN_STATE_FILE), "\0\0garbage").unwrap();
    touch(&temp, &["episode-meta.json", "audio-meta.json"]);

    let mut state = RunState::load_or_new(temp.path());
    assert!(state.completed_steps().is_empty());

    let newly = state.reconcile_with_detector();
    assert_eq!(
        newly,
        BTreeSet::from([PipelineStepKind::Fetch, PipelineStepKind::Transcode])
    );
    state.save().unwrap();
    assert!(RunState::load(temp.path()).is_some());
}
