//! LLM-backed batch operations over segment texts.
//!
//! Texts are partitioned into fixed-size batches, one model call per batch,
//! issued sequentially so that positional indices stay meaningful. Each batch
//! is sent as one payload joined with [`SEGMENT_DELIMITER`] and the response
//! is split on the same delimiter. If the number of returned items differs
//! from the batch size, the whole batch falls back to its original content
//! and a warning is recorded; a batch is never partially applied.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::adapters::TextModel;

/// Separator between items in a batch payload and response
pub const SEGMENT_DELIMITER: &str = "---SEGMENT---";

/// Default number of segments per model call
pub const DEFAULT_BATCH_SIZE: usize = 20;

const RESTORE_SYSTEM: &str = "You restore punctuation, casing and obvious \
transcription errors in podcast transcript segments. Do not paraphrase, add \
or remove content. Return exactly one restored segment per input segment, in \
the same order, separated by a line containing only ---SEGMENT---.";

const ADS_SYSTEM: &str = "You classify podcast transcript segments. For each \
input segment answer AD if it is a sponsor read or advertisement, otherwise \
CONTENT. Return exactly one answer per input segment, in the same order, \
separated by a line containing only ---SEGMENT---.";

/// Result of a batch operation: one item per input plus any warnings
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub items: Vec<T>,
    pub warnings: Vec<String>,
}

/// Join a batch into a single payload
pub fn join_batch(texts: &[String]) -> String {
    texts.join(&format!("\n{}\n", SEGMENT_DELIMITER))
}

/// Split a model response back into items
///
/// Only a line consisting of the delimiter separates items. Items are
/// trimmed and empty items are kept, so the split is the inverse of
/// [`join_batch`] even for segments with no text.
pub fn split_response(response: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in response.lines() {
        if line.trim() == SEGMENT_DELIMITER {
            items.push(current.join("\n").trim().to_string());
            current.clear();
        } else {
            current.push(line);
        }
    }
    items.push(current.join("\n").trim().to_string());

    items
}

/// Restore segment texts batch by batch
///
/// The output always has the same length as `texts`.
pub async fn restore_texts(
    model: &dyn TextModel,
    texts: &[String],
    batch_size: usize,
) -> Result<BatchOutcome<String>> {
    let batch_size = batch_size.max(1);
    let mut items = Vec::with_capacity(texts.len());
    let mut warnings = Vec::new();

    for (index, batch) in texts.chunks(batch_size).enumerate() {
        let response = model
            .complete(RESTORE_SYSTEM, &join_batch(batch))
            .await
            .with_context(|| format!("Restore batch {} failed", index))?;

        let restored = split_response(&response);
        if restored.len() == batch.len() {
            debug!(batch = index, size = batch.len(), "Restored batch");
            items.extend(restored);
        } else {
            let message = format!(
                "restore batch {} returned {} items for {} segments; kept original text",
                index,
                restored.len(),
                batch.len()
            );
            warn!(batch = index, expected = batch.len(), got = restored.len(), "Restore batch mismatch, keeping original text");
            warnings.push(message);
            items.extend(batch.iter().cloned());
        }
    }

    Ok(BatchOutcome { items, warnings })
}

/// Classify each segment text as advertisement (`true`) or content
///
/// On a count mismatch every segment in the batch is treated as content.
pub async fn classify_ads(
    model: &dyn TextModel,
    texts: &[String],
    batch_size: usize,
) -> Result<BatchOutcome<bool>> {
    let batch_size = batch_size.max(1);
    let mut items = Vec::with_capacity(texts.len());
    let mut warnings = Vec::new();

    for (index, batch) in texts.chunks(batch_size).enumerate() {
        let response = model
            .complete(ADS_SYSTEM, &join_batch(batch))
            .await
            .with_context(|| format!("Ad classification batch {} failed", index))?;

        let labels = split_response(&response);
        if labels.len() == batch.len() {
            items.extend(labels.iter().map(|label| is_ad_label(label)));
        } else {
            let message = format!(
                "ad classification batch {} returned {} labels for {} segments; treated as content",
                index,
                labels.len(),
                batch.len()
            );
            warn!(batch = index, expected = batch.len(), got = labels.len(), "Ad classification mismatch, treating batch as content");
            warnings.push(message);
            items.extend(std::iter::repeat(false).take(batch.len()));
        }
    }

    Ok(BatchOutcome { items, warnings })
}

fn is_ad_label(label: &str) -> bool {
    let label = label.trim().trim_matches(|c: char| !c.is_alphanumeric());
    ["ad", "ads", "advertisement", "sponsor", "yes", "true"]
        .iter()
        .any(|l| label.eq_ignore_ascii_case(l))
}
