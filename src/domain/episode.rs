//! Episode and audio metadata documents.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized episode metadata (`episode-meta.json`)
///
/// All fetch sources (pre-selected, video URL, feed search) produce this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    /// Show / channel name
    #[serde(default)]
    pub show: String,

    /// Episode title
    #[serde(default)]
    pub episode_title: String,

    /// Publication date as reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_published: Option<String>,

    /// Path of the downloaded source audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,

    /// Feed URL the episode came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EpisodeMeta {
    /// Parse metadata from a document returned by a fetch operation
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Document is not episode metadata")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read episode metadata: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse episode metadata: {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write episode metadata: {}", path.display()))
    }

    /// Date part of the publication timestamp (YYYY-MM-DD), if parseable
    pub fn published_date(&self) -> Option<String> {
        let raw = self.episode_published.as_deref()?.trim();

        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
        if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(raw) {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
        if let Ok(d) = chrono::NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d") {
            return Some(d.format("%Y-%m-%d").to_string());
        }
        None
    }
}

/// Transcoded audio description (`audio-meta.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMeta {
    /// Path of the transcoded audio file
    pub audio_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AudioMeta {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Document is not audio metadata")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read audio metadata: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse audio metadata: {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write audio metadata: {}", path.display()))
    }
}

/// Turn a show name into a directory-safe slug
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;

    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "episode".to_string()
    } else {
        trimmed.to_string()
    }
}
