//! Persisted run state for crash recovery.
//!
//! The state file lives in the working directory (`run-state.json`). Loading
//! never fails: a missing, unreadable or corrupt file is reported as "no
//! state" so that resuming degrades to recomputing from artifacts. Artifacts
//! found on disk are authoritative, so reconciliation only ever adds kinds.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::PipelineStepKind;

use super::detector::{ArtifactDetector, RUN_STATE_FILE};

/// On-disk shape of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunStateFile {
    completed_steps: BTreeSet<PipelineStepKind>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Completed kinds and metadata for one working directory
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    working_dir: PathBuf,
    completed_steps: BTreeSet<PipelineStepKind>,
    metadata: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh, empty state for a working directory (not yet saved)
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            working_dir: working_dir.into(),
            completed_steps: BTreeSet::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Path of the state file for a working directory
    pub fn path_for(working_dir: &Path) -> PathBuf {
        working_dir.join(RUN_STATE_FILE)
    }

    /// Load persisted state; any problem reads as "no state"
    pub fn load(working_dir: &Path) -> Option<Self> {
        let path = Self::path_for(working_dir);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Run state unreadable, ignoring it");
                return None;
            }
        };

        match serde_json::from_str::<RunStateFile>(&content) {
            Ok(file) => Some(Self {
                working_dir: working_dir.to_path_buf(),
                completed_steps: file.completed_steps,
                metadata: file.metadata,
                created_at: file.created_at,
                updated_at: file.updated_at,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Run state corrupt, ignoring it");
                None
            }
        }
    }

    /// Load persisted state or start a fresh one
    pub fn load_or_new(working_dir: &Path) -> Self {
        Self::load(working_dir).unwrap_or_else(|| Self::new(working_dir))
    }

    /// Overwrite the state file atomically (temp file + rename)
    pub fn save(&mut self) -> Result<()> {
        self.updated_at = Utc::now();

        std::fs::create_dir_all(&self.working_dir).with_context(|| {
            format!(
                "Failed to create working directory: {}",
                self.working_dir.display()
            )
        })?;

        let file = RunStateFile {
            completed_steps: self.completed_steps.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize run state")?;

        let path = Self::path_for(&self.working_dir);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.working_dir)
            .context("Failed to create temporary run state file")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write run state")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush run state")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace run state: {}", path.display()))?;

        Ok(())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn mark_completed(&mut self, kind: PipelineStepKind) {
        self.completed_steps.insert(kind);
    }

    pub fn is_completed(&self, kind: PipelineStepKind) -> bool {
        self.completed_steps.contains(&kind)
    }

    pub fn completed_steps(&self) -> &BTreeSet<PipelineStepKind> {
        &self.completed_steps
    }

    /// Merge kinds detected on disk; returns the ones that were not recorded
    pub fn reconcile_with_detector(&mut self) -> BTreeSet<PipelineStepKind> {
        let detected = ArtifactDetector::new(&self.working_dir).completed_kinds();
        let newly: BTreeSet<_> = detected
            .difference(&self.completed_steps)
            .copied()
            .collect();
        self.completed_steps.extend(newly.iter().copied());
        newly
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn metadata_map(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
