//! Batch transform engine tests with a scripted text model.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use podx::adapters::TextModel;
use podx::domain::{Segment, Transcript};
use podx::transform::{
    merge_pair, merge_segments, preprocess, restore_texts, MergeConfig, PreprocessOptions,
    SEGMENT_DELIMITER,
};

/// Returns scripted responses in order and records the prompts it saw
struct ScriptedModel {
    responses: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_short_restore_response_keeps_original_batch() {
    let model = ScriptedModel::new(&[&format!("Uno.\n{}\nDos.", SEGMENT_DELIMITER)]);
    let input = texts(&["uno", "dos", "tres"]);

    let outcome = restore_texts(&model, &input, 20).await.unwrap();

    assert_eq!(outcome.items, input);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("returned 2 items for 3 segments"));
}

#[tokio::test]
async fn test_restore_through_preprocess_keeps_segment_count() {
    let transcript = Transcript::from_segments(vec![
        Segment::new(0.0, 1.0, "uno"),
        Segment::new(10.0, 11.0, "dos"),
        Segment::new(20.0, 21.0, "tres"),
    ]);
    let options = PreprocessOptions {
        restore: true,
        ..Default::default()
    };
    let model = ScriptedModel::new(&[&format!("Uno.\n{}\nDos.", SEGMENT_DELIMITER)]);

    let outcome = preprocess(&transcript, &options, Some(&model)).await.unwrap();

    let result: Vec<&str> = outcome
        .transcript
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect();
    assert_eq!(result, vec!["uno", "dos", "tres"]);
    assert_eq!(outcome.warnings.len(), 1);
}

#[tokio::test]
async fn test_batches_are_sequential_and_independent() {
    let d = SEGMENT_DELIMITER;
    // First batch mismatches, second applies
    let model = ScriptedModel::new(&["only one", &format!("C.\n{}\nD.", d)]);
    let input = texts(&["a", "b", "c", "d"]);

    let outcome = restore_texts(&model, &input, 2).await.unwrap();

    assert_eq!(outcome.items, texts(&["a", "b", "C.", "D."]));
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(
        model.prompts(),
        vec![format!("a\n{}\nb", d), format!("c\n{}\nd", d)]
    );
}

#[tokio::test]
async fn test_empty_segment_text_survives_restore() {
    let d = SEGMENT_DELIMITER;
    let model = ScriptedModel::new(&[&format!("Hello.\n{d}\n\n{d}\nBye.")]);
    let input = texts(&["hello", "", "bye"]);

    let outcome = restore_texts(&model, &input, 20).await.unwrap();

    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.items, texts(&["Hello.", "", "Bye."]));
}

#[tokio::test]
async fn test_ads_are_dropped() {
    let d = SEGMENT_DELIMITER;
    let transcript = Transcript::from_segments(vec![
        Segment::new(0.0, 1.0, "Welcome to the show."),
        Segment::new(10.0, 11.0, "This episode is brought to you by Acme."),
        Segment::new(20.0, 21.0, "Back to the interview."),
    ]);
    let options = PreprocessOptions {
        drop_ads: true,
        ..Default::default()
    };
    let model = ScriptedModel::new(&[&format!("CONTENT\n{d}\nAD\n{d}\nCONTENT")]);

    let outcome = preprocess(&transcript, &options, Some(&model)).await.unwrap();

    assert_eq!(outcome.ads_removed, 1);
    assert_eq!(outcome.transcript.segments.len(), 2);
    assert_eq!(outcome.transcript.segments[1].text, "Back to the interview.");
}

#[test]
fn test_merge_is_associative() {
    let a = Segment::new(0.0, 1.0, "one");
    let b = Segment::new(1.1, 2.5, "two");
    let c = Segment::new(2.0, 3.0, "three");

    let left = merge_pair(&merge_pair(&a, &b), &c);
    let right = merge_pair(&a, &merge_pair(&b, &c));

    assert_eq!(left, right);
    assert_eq!(left.text, "one two three");
    assert_eq!(left.end, 3.0);
}

#[test]
fn test_merge_requires_all_conditions() {
    let config = MergeConfig::default();
    let segments = vec![
        Segment::new(0.0, 1.0, "close").with_speaker("A"),
        Segment::new(1.5, 2.0, "same speaker").with_speaker("A"),
        Segment::new(2.1, 3.0, "other speaker").with_speaker("B"),
        Segment::new(4.5, 5.0, "too far").with_speaker("B"),
    ];

    let merged = merge_segments(&segments, &config);
    let texts: Vec<&str> = merged.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["close same speaker", "other speaker", "too far"]);
}
