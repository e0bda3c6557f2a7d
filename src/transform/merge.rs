//! Segment merging.
//!
//! Adjacent segments are combined when all three hold: the gap is below
//! `max_gap`, the combined text fits in `max_len`, and both carry the same
//! speaker (or are both unlabeled).

use serde::{Deserialize, Serialize};

use crate::domain::Segment;

/// Thresholds for merging
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum silence between segments, in seconds (exclusive)
    #[serde(default = "default_max_gap")]
    pub max_gap: f64,

    /// Maximum merged text length, in characters (inclusive)
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

fn default_max_gap() -> f64 {
    1.0
}
fn default_max_len() -> usize {
    800
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_gap: default_max_gap(),
            max_len: default_max_len(),
        }
    }
}

/// Whether `next` may be merged into `current`
pub fn can_merge(current: &Segment, next: &Segment, config: &MergeConfig) -> bool {
    let gap = next.start - current.end;
    let combined_len = joined_len(&current.text, &next.text);

    gap < config.max_gap && combined_len <= config.max_len && current.speaker == next.speaker
}

/// Combine two segments into one
pub fn merge_pair(current: &Segment, next: &Segment) -> Segment {
    let words = match (&current.words, &next.words) {
        (None, None) => None,
        (a, b) => Some(
            a.iter()
                .chain(b.iter())
                .flat_map(|w| w.iter().cloned())
                .collect(),
        ),
    };

    Segment {
        start: current.start,
        end: current.end.max(next.end),
        text: join_text(&current.text, &next.text),
        speaker: current.speaker.clone(),
        words,
    }
}

/// Greedily merge a segment list in order
pub fn merge_segments(segments: &[Segment], config: &MergeConfig) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());

    for segment in segments {
        match merged.last_mut() {
            Some(current) if can_merge(current, segment, config) => {
                *current = merge_pair(current, segment);
            }
            _ => merged.push(segment.clone()),
        }
    }

    merged
}

fn join_text(a: &str, b: &str) -> String {
    let a = a.trim();
    let b = b.trim();
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{} {}", a, b),
    }
}

fn joined_len(a: &str, b: &str) -> usize {
    join_text(a, b).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_close_segments() {
        let segments = vec![
            Segment::new(0.0, 1.0, "Hello"),
            Segment::new(1.2, 2.0, "world."),
            Segment::new(5.0, 6.0, "Later."),
        ];

        let merged = merge_segments(&segments, &MergeConfig::default());
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "Hello world.");
        assert_eq!(merged[0].start, 0.0);
        assert_eq!(merged[0].end, 2.0);
    }

    #[test]
    fn test_speaker_change_blocks_merge() {
        let a = Segment::new(0.0, 1.0, "Hi").with_speaker("SPEAKER_00");
        let b = Segment::new(1.1, 2.0, "Hey").with_speaker("SPEAKER_01");
        let c = Segment::new(2.1, 3.0, "Unlabeled");

        assert!(!can_merge(&a, &b, &MergeConfig::default()));
        assert!(!can_merge(&b, &c, &MergeConfig::default()));
    }

    #[test]
    fn test_length_cap_blocks_merge() {
        let config = MergeConfig {
            max_len: 10,
            ..Default::default()
        };
        let a = Segment::new(0.0, 1.0, "12345");
        let b = Segment::new(1.0, 2.0, "6789");
        let c = Segment::new(1.0, 2.0, "67890");

        // "12345 6789" is exactly 10 chars
        assert!(can_merge(&a, &b, &config));
        assert!(!can_merge(&a, &c, &config));
    }

    #[test]
    fn test_gap_is_exclusive() {
        let a = Segment::new(0.0, 1.0, "a");
        let b = Segment::new(2.0, 3.0, "b");
        assert!(!can_merge(&a, &b, &MergeConfig::default()));
    }

    #[test]
    fn test_overlapping_segments_merge() {
        let a = Segment::new(0.0, 3.0, "a");
        let b = Segment::new(2.0, 2.5, "b");
        let merged = merge_pair(&a, &b);
        assert_eq!(merged.end, 3.0);
    }
}
