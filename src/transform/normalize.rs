//! Text normalization.
//!
//! Collapses whitespace, removes spaces before punctuation and puts a space
//! after clause punctuation that runs into the next word. Applying it twice
//! gives the same result as applying it once.

use crate::domain::Segment;

const CLOSING_PUNCT: &[char] = &[',', '.', ';', ':', '!', '?', ')', ']', '%'];
const SPACED_PUNCT: &[char] = &[',', ';', '!', '?'];

/// Normalize a single text fragment
pub fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = collapsed.chars().collect();
    let mut out = String::with_capacity(collapsed.len());

    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' && chars.get(i + 1).is_some_and(|n| CLOSING_PUNCT.contains(n)) {
            continue;
        }

        out.push(c);

        if SPACED_PUNCT.contains(&c) && chars.get(i + 1).is_some_and(|n| n.is_alphabetic()) {
            out.push(' ');
        }
    }

    out
}

/// Normalize every segment's text in place
pub fn normalize_segments(segments: &mut [Segment]) {
    for segment in segments {
        segment.text = normalize_text(&segment.text);
    }
}
