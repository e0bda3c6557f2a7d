//! Per-show configuration overrides.
//!
//! Shows can pin their own toggles and models (e.g. always diarize an
//! interview show, never run deepcast on a news bulletin). Overrides are
//! applied once, right after Fetch, to the shared pipeline configuration.
//!
//! ```yaml
//! shows:
//!   "Lex Fridman Podcast":
//!     diarize: true
//!     asr_model: large-v3
//!     deepcast_type: interview_guest_focused
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::PipelineConfig;

/// Supplies per-show overrides
pub trait ShowConfigSource: Send + Sync {
    /// Overrides for a show, matched case-insensitively
    fn overrides_for(&self, show: &str) -> Option<ShowOverrides>;
}

/// Overrides for one show; unset fields leave the configuration alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowOverrides {
    pub align: Option<bool>,
    pub diarize: Option<bool>,
    pub preprocess: Option<bool>,
    pub restore: Option<bool>,
    pub deepcast: Option<bool>,
    pub notion: Option<bool>,
    pub asr_model: Option<String>,
    pub deepcast_model: Option<String>,
    pub deepcast_type: Option<String>,
}

impl ShowOverrides {
    /// Apply to a configuration; returns the names of the fields changed
    pub fn apply_to(&self, config: &mut PipelineConfig) -> Vec<&'static str> {
        let mut changed = Vec::new();

        fn set<T: PartialEq + Clone>(
            target: &mut T,
            value: &Option<T>,
            name: &'static str,
            changed: &mut Vec<&'static str>,
        ) {
            if let Some(v) = value {
                if target != v {
                    *target = v.clone();
                    changed.push(name);
                }
            }
        }

        set(&mut config.align, &self.align, "align", &mut changed);
        set(&mut config.diarize, &self.diarize, "diarize", &mut changed);
        set(&mut config.preprocess, &self.preprocess, "preprocess", &mut changed);
        set(
            &mut config.preprocess_options.restore,
            &self.restore,
            "restore",
            &mut changed,
        );
        set(&mut config.deepcast, &self.deepcast, "deepcast", &mut changed);
        set(&mut config.notion, &self.notion, "notion", &mut changed);
        set(&mut config.asr_model, &self.asr_model, "asr_model", &mut changed);
        set(
            &mut config.deepcast_model,
            &self.deepcast_model,
            "deepcast_model",
            &mut changed,
        );
        if let Some(ref t) = self.deepcast_type {
            if config.deepcast_type.as_deref() != Some(t.as_str()) {
                config.deepcast_type = Some(t.clone());
                changed.push("deepcast_type");
            }
        }

        changed
    }
}

/// YAML-backed show overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowConfigFile {
    #[serde(default)]
    shows: HashMap<String, ShowOverrides>,
}

impl ShowConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read show config: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse show config: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl ShowConfigSource for ShowConfigFile {
    fn overrides_for(&self, show: &str) -> Option<ShowOverrides> {
        let wanted = show.trim();
        self.shows
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, overrides)| overrides.clone())
    }
}

/// No overrides for any show
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShowConfig;

impl ShowConfigSource for NoShowConfig {
    fn overrides_for(&self, _show: &str) -> Option<ShowOverrides> {
        None
    }
}
