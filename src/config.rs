//! Configuration for podx.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PODX_HOME, PODX_OUTPUT_ROOT, PODX_SHOWS)
//! 2. Config file (.podx/config.yaml)
//! 3. Defaults (~/.podx, current directory as output root)
//!
//! Config file discovery:
//! - Searches current directory and parents for .podx/config.yaml
//! - Paths in config file are relative to the project root (parent of .podx/)

pub mod shows;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::WorkdirIndex;
use crate::domain::{EpisodeMeta, PipelineStepKind};
use crate::transform::PreprocessOptions;

pub use shows::{NoShowConfig, ShowConfigFile, ShowConfigSource, ShowOverrides};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory
    pub home: Option<String>,
    /// Root under which per-episode working directories are created
    pub output_root: Option<String>,
    /// Per-show overrides file
    pub shows: Option<String>,
}

/// Where an episode comes from. Exactly one source per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FetchSource {
    /// Metadata already chosen by a front-end (e.g. an interactive browser)
    Preselected { episode: EpisodeMeta },

    /// Remote video URL
    Youtube { url: String },

    /// Feed search by show name or RSS URL
    Feed {
        #[serde(default)]
        show: Option<String>,
        #[serde(default)]
        rss_url: Option<String>,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        title_contains: Option<String>,
    },
}

impl FetchSource {
    /// Stable identity of the source, used to find its working directory again
    pub fn key(&self) -> String {
        match self {
            FetchSource::Preselected { episode } => {
                format!("episode:{}:{}", episode.show, episode.episode_title)
            }
            FetchSource::Youtube { url } => format!("youtube:{}", url.trim()),
            FetchSource::Feed {
                show,
                rss_url,
                date,
                title_contains,
            } => format!(
                "feed:{}:{}:{}",
                show.as_deref()
                    .map(str::to_lowercase)
                    .or_else(|| rss_url.clone())
                    .unwrap_or_default(),
                date.as_deref().unwrap_or_default(),
                title_contains.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Executables backing each delegated operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTable {
    pub fetch: String,
    pub youtube: String,
    pub transcode: String,
    pub transcribe: String,
    pub align: String,
    pub diarize: String,
    pub export: String,
    pub deepcast: String,
    pub notion: String,
    pub llm: String,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            fetch: "podx-fetch".to_string(),
            youtube: "podx-youtube".to_string(),
            transcode: "podx-transcode".to_string(),
            transcribe: "podx-transcribe".to_string(),
            align: "podx-align".to_string(),
            diarize: "podx-diarize".to_string(),
            export: "podx-export".to_string(),
            deepcast: "podx-deepcast".to_string(),
            notion: "podx-notion".to_string(),
            llm: "podx-llm".to_string(),
        }
    }
}

/// Options for one pipeline run
///
/// Read-only for steps, except that Fetch applies per-show overrides once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: Option<FetchSource>,

    /// Explicit working directory (derived from show/date when absent)
    pub workdir: Option<PathBuf>,

    pub output_root: PathBuf,

    /// Transcode target format
    pub fmt: String,

    pub asr_model: String,
    pub compute: String,
    pub asr_provider: Option<String>,

    pub preprocess: bool,
    pub preprocess_options: PreprocessOptions,
    pub align: bool,
    pub diarize: bool,

    pub deepcast: bool,
    pub deepcast_model: String,
    pub deepcast_type: Option<String>,

    pub notion: bool,
    pub notion_db: Option<String>,

    /// Formats passed to the export operation (empty: only latest.json)
    pub export_formats: Vec<String>,

    /// Remove intermediate artifacts at the end
    pub clean: bool,
    /// Keep the transcoded audio during cleanup
    pub keep_audio: bool,

    /// End the run once the step covering this kind has finished
    pub stop_after: Option<PipelineStepKind>,

    /// Model used by the preprocess text model
    pub llm_model: String,

    pub commands: CommandTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: None,
            workdir: None,
            output_root: PathBuf::from("."),
            fmt: "wav16".to_string(),
            asr_model: "large-v3".to_string(),
            compute: "int8".to_string(),
            asr_provider: None,
            preprocess: false,
            preprocess_options: PreprocessOptions::default(),
            align: false,
            diarize: false,
            deepcast: false,
            deepcast_model: "gpt-4.1-mini".to_string(),
            deepcast_type: None,
            notion: false,
            notion_db: None,
            export_formats: Vec::new(),
            clean: false,
            keep_audio: true,
            stop_after: None,
            llm_model: "gpt-4.1-mini".to_string(),
            commands: CommandTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Whether the enhancement step has anything to do
    pub fn enhancement_enabled(&self) -> bool {
        self.preprocess || self.align || self.diarize
    }

    /// Working directory known before fetching, if any
    ///
    /// An explicit workdir wins; otherwise a feed request naming both show and
    /// date (or a pre-selected episode with a parseable date) maps to
    /// `<output_root>/<slug(show)>/<date>`. Any other source resumes in the
    /// directory an earlier fetch of it recorded in the workdir index.
    pub fn planned_workdir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.workdir {
            return Some(dir.clone());
        }
        let derived = match self.source {
            Some(FetchSource::Feed {
                show: Some(ref show),
                date: Some(ref date),
                ..
            }) => Some(self.episode_workdir(show, date)),
            Some(FetchSource::Preselected { ref episode }) => episode
                .published_date()
                .map(|date| self.episode_workdir(&episode.show, &date)),
            _ => None,
        };
        derived.or_else(|| {
            let source = self.source.as_ref()?;
            WorkdirIndex::load(&self.output_root).lookup(&source.key())
        })
    }

    /// Working directory for an episode of `show` published on `date`
    pub fn episode_workdir(&self, show: &str, date: &str) -> PathBuf {
        self.output_root
            .join(crate::domain::slugify(show))
            .join(date)
    }

    /// Parse a pipeline configuration from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline configuration")
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state directory
    pub home: PathBuf,
    /// Output root for working directories
    pub output_root: PathBuf,
    /// Per-show overrides file (if configured)
    pub shows_file: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Pipeline defaults from the config file
    pub pipeline: PipelineConfig,
}

impl ResolvedConfig {
    /// Load the per-show overrides collaborator
    pub fn show_config(&self) -> Result<Box<dyn ShowConfigSource>> {
        match self.shows_file {
            Some(ref path) if path.exists() => Ok(Box::new(ShowConfigFile::load(path)?)),
            _ => Ok(Box::new(NoShowConfig)),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".podx").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".podx");

    let config_file = find_config_file();

    let (home, output_root, shows_file, pipeline) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .podx/ (i.e., grandparent of config.yaml)
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("PODX_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            resolve_path(base_dir, home_path)
        } else {
            default_home.clone()
        };

        let output_root = if let Ok(env_root) = std::env::var("PODX_OUTPUT_ROOT") {
            PathBuf::from(env_root)
        } else if let Some(ref root) = config.paths.output_root {
            resolve_path(base_dir, root)
        } else {
            PathBuf::from(".")
        };

        let shows_file = if let Ok(env_shows) = std::env::var("PODX_SHOWS") {
            Some(PathBuf::from(env_shows))
        } else if let Some(ref shows) = config.paths.shows {
            Some(resolve_path(base_dir, shows))
        } else {
            Some(home.join("shows.yaml"))
        };

        (home, output_root, shows_file, config.pipeline.unwrap_or_default())
    } else {
        let home = std::env::var("PODX_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        let output_root = std::env::var("PODX_OUTPUT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let shows_file = std::env::var("PODX_SHOWS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("shows.yaml"));

        (home, output_root, Some(shows_file), PipelineConfig::default())
    };

    let mut pipeline = pipeline;
    pipeline.output_root = output_root.clone();

    Ok(ResolvedConfig {
        home,
        output_root,
        shows_file,
        config_file,
        pipeline,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let podx_dir = temp.path().join(".podx");
        std::fs::create_dir_all(&podx_dir).unwrap();

        let config_path = podx_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  output_root: ./episodes
  shows: ./shows.yaml
pipeline:
  asr_model: medium
  diarize: true
  export_formats: [txt, srt]
  commands:
    transcribe: python -m podx.transcribe
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.output_root.as_deref(), Some("./episodes"));

        let pipeline = config.pipeline.unwrap();
        assert_eq!(pipeline.asr_model, "medium");
        assert!(pipeline.diarize);
        assert!(!pipeline.align);
        assert_eq!(pipeline.export_formats, vec!["txt", "srt"]);
        assert_eq!(pipeline.commands.transcribe, "python -m podx.transcribe");
        // Unlisted commands keep their defaults
        assert_eq!(pipeline.commands.diarize, "podx-diarize");
    }

    #[test]
    fn test_fetch_source_yaml() {
        let config = PipelineConfig::from_yaml(
            r#"
source:
  mode: feed
  show: The Daily
  date: "2024-01-02"
"#,
        )
        .unwrap();

        assert_eq!(
            config.planned_workdir(),
            Some(PathBuf::from("./the-daily/2024-01-02"))
        );
    }

    #[test]
    fn test_planned_workdir_prefers_explicit() {
        let config = PipelineConfig {
            workdir: Some(PathBuf::from("/tmp/ep")),
            source: Some(FetchSource::Youtube {
                url: "https://youtu.be/x".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(config.planned_workdir(), Some(PathBuf::from("/tmp/ep")));

        let temp = TempDir::new().unwrap();
        let unplanned = PipelineConfig {
            output_root: temp.path().to_path_buf(),
            source: Some(FetchSource::Youtube {
                url: "https://youtu.be/x".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(unplanned.planned_workdir(), None);
    }

    #[test]
    fn test_planned_workdir_falls_back_to_index() {
        let temp = TempDir::new().unwrap();
        let source = FetchSource::Feed {
            show: Some("Hard Fork".to_string()),
            rss_url: None,
            date: None,
            title_contains: None,
        };
        let dir = temp.path().join("hard-fork").join("2024-05-03");
        std::fs::create_dir_all(&dir).unwrap();

        let mut index = WorkdirIndex::load(temp.path());
        index.record(source.key(), &dir);
        index.save().unwrap();

        let config = PipelineConfig {
            output_root: temp.path().to_path_buf(),
            source: Some(source),
            ..Default::default()
        };
        assert_eq!(config.planned_workdir(), Some(dir));

        // A different search does not pick it up
        let other = PipelineConfig {
            source: Some(FetchSource::Feed {
                show: Some("Hard Fork".to_string()),
                rss_url: None,
                date: None,
                title_contains: Some("AI".to_string()),
            }),
            ..config
        };
        assert_eq!(other.planned_workdir(), None);
    }

    #[test]
    fn test_source_keys() {
        let youtube = FetchSource::Youtube {
            url: " https://youtu.be/x ".to_string(),
        };
        assert_eq!(youtube.key(), "youtube:https://youtu.be/x");

        let feed = FetchSource::Feed {
            show: Some("Hard Fork".to_string()),
            rss_url: None,
            date: None,
            title_contains: None,
        };
        assert_eq!(feed.key(), "feed:hard fork::");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
