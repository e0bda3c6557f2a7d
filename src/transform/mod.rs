//! Batch document-transform engine.
//!
//! Pure transforms over a segmented transcript, used by the preprocess stage:
//! - merge: combine adjacent same-speaker segments
//! - normalize: idempotent whitespace/punctuation cleanup
//! - batch: LLM restore and ad classification with fallback on mismatch

pub mod batch;
pub mod merge;
pub mod normalize;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::adapters::TextModel;
use crate::domain::Transcript;

pub use batch::{classify_ads, restore_texts, BatchOutcome, DEFAULT_BATCH_SIZE, SEGMENT_DELIMITER};
pub use merge::{can_merge, merge_pair, merge_segments, MergeConfig};
pub use normalize::{normalize_segments, normalize_text};

/// Which transforms to apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessOptions {
    #[serde(default = "default_true")]
    pub merge: bool,

    #[serde(default = "default_true")]
    pub normalize: bool,

    /// LLM restore (needs a text model)
    #[serde(default)]
    pub restore: bool,

    /// Drop segments classified as ads (needs a text model)
    #[serde(default)]
    pub drop_ads: bool,

    #[serde(default)]
    pub merge_config: MergeConfig,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            merge: true,
            normalize: true,
            restore: false,
            drop_ads: false,
            merge_config: MergeConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PreprocessOptions {
    /// Whether any transform needs a text model
    pub fn needs_model(&self) -> bool {
        self.restore || self.drop_ads
    }
}

/// Output of [`preprocess`]
#[derive(Debug, Clone)]
pub struct PreprocessOutcome {
    pub transcript: Transcript,
    pub warnings: Vec<String>,
    pub ads_removed: usize,
}

/// Apply merge → normalize → ad redaction → restore to a transcript copy
pub async fn preprocess(
    transcript: &Transcript,
    options: &PreprocessOptions,
    model: Option<&dyn TextModel>,
) -> Result<PreprocessOutcome> {
    let mut out = transcript.clone();
    let mut warnings = Vec::new();
    let mut ads_removed = 0;

    if options.merge {
        out.segments = merge_segments(&out.segments, &options.merge_config);
    }

    if options.normalize {
        normalize_segments(&mut out.segments);
    }

    if options.needs_model() {
        let model = model.ok_or_else(|| {
            anyhow::anyhow!("Restore/ad filtering requested but no text model is configured")
        })?;

        if options.drop_ads {
            let texts: Vec<String> = out.segments.iter().map(|s| s.text.clone()).collect();
            let flags = classify_ads(model, &texts, options.batch_size).await?;
            warnings.extend(flags.warnings);

            let before = out.segments.len();
            out.segments = out
                .segments
                .into_iter()
                .zip(flags.items)
                .filter_map(|(segment, is_ad)| (!is_ad).then_some(segment))
                .collect();
            ads_removed = before - out.segments.len();
        }

        if options.restore {
            let texts: Vec<String> = out.segments.iter().map(|s| s.text.clone()).collect();
            let restored = restore_texts(model, &texts, options.batch_size).await?;
            warnings.extend(restored.warnings);

            for (segment, text) in out.segments.iter_mut().zip(restored.items) {
                segment.text = text;
            }
        }
    }

    out.set_flag("preprocessed", true);
    if options.restore {
        out.set_flag("restored", true);
    }

    Ok(PreprocessOutcome {
        transcript: out,
        warnings,
        ads_removed,
    })
}
