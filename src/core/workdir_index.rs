//! Index of working directories under an output root.
//!
//! Some sources only reveal their working directory after fetching (video
//! URLs, feed searches without a date). Fetch records where each source
//! landed so that a rerun of the same source finds the directory before
//! any step runs. Loading never fails: a missing or corrupt index is empty.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Index file name inside the output root
pub const WORKDIR_INDEX_FILE: &str = ".podx-workdirs.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkdirEntry {
    /// Relative to the output root when the directory lives under it
    pub workdir: PathBuf,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkdirIndexFile {
    #[serde(default)]
    entries: BTreeMap<String, WorkdirEntry>,
}

/// Source key to working directory mapping for one output root
#[derive(Debug, Clone, PartialEq)]
pub struct WorkdirIndex {
    output_root: PathBuf,
    entries: BTreeMap<String, WorkdirEntry>,
}

impl WorkdirIndex {
    pub fn path_for(output_root: &Path) -> PathBuf {
        output_root.join(WORKDIR_INDEX_FILE)
    }

    /// Load the index; any problem reads as an empty index
    pub fn load(output_root: &Path) -> Self {
        let mut index = Self {
            output_root: output_root.to_path_buf(),
            entries: BTreeMap::new(),
        };

        let path = Self::path_for(output_root);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Workdir index unreadable, ignoring it");
                return index;
            }
        };

        match serde_json::from_str::<WorkdirIndexFile>(&content) {
            Ok(file) => index.entries = file.entries,
            Err(e) => warn!(path = %path.display(), error = %e, "Workdir index corrupt, ignoring it"),
        }
        index
    }

    /// Recorded directory for a source, if it still exists
    pub fn lookup(&self, key: &str) -> Option<PathBuf> {
        let entry = self.entries.get(key)?;
        let dir = self.output_root.join(&entry.workdir);
        dir.is_dir().then_some(dir)
    }

    pub fn record(&mut self, key: impl Into<String>, workdir: &Path) {
        let workdir = workdir
            .strip_prefix(&self.output_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| workdir.to_path_buf());
        self.entries.insert(
            key.into(),
            WorkdirEntry {
                workdir,
                recorded_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite the index atomically (temp file + rename)
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_root).with_context(|| {
            format!(
                "Failed to create output root: {}",
                self.output_root.display()
            )
        })?;

        let file = WorkdirIndexFile {
            entries: self.entries.clone(),
        };
        let json =
            serde_json::to_string_pretty(&file).context("Failed to serialize workdir index")?;

        let path = Self::path_for(&self.output_root);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.output_root)
            .context("Failed to create temporary workdir index")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write workdir index")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace workdir index: {}", path.display()))?;

        Ok(())
    }
}
