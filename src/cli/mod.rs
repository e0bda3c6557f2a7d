//! Command-line interface for podx.
//!
//! Provides commands for running the pipeline for one episode, inspecting
//! the state of a working directory, and showing the resolved configuration.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::adapters::ProcessRunner;
use crate::config::{self, FetchSource, PipelineConfig};
use crate::core::{ArtifactDetector, Orchestrator, RunOutcome, RunState, TracingProgress};
use crate::domain::{EpisodeMeta, PipelineStepKind};
use crate::steps::build_pipeline;

/// podx - Resumable podcast processing pipeline
#[derive(Parser, Debug)]
#[command(name = "podx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, transcribe and process one episode (resumes automatically)
    Run(RunArgs),

    /// Show completed steps and artifacts of a working directory
    Status {
        /// Episode working directory
        workdir: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Show name to search feeds for
    #[arg(long, conflicts_with_all = ["youtube_url", "episode"])]
    pub show: Option<String>,

    /// RSS feed URL
    #[arg(long, conflicts_with_all = ["youtube_url", "episode"])]
    pub rss_url: Option<String>,

    /// Video URL to fetch instead of a feed episode
    #[arg(long, conflicts_with = "episode")]
    pub youtube_url: Option<String>,

    /// Episode metadata chosen elsewhere (JSON file)
    #[arg(long)]
    pub episode: Option<PathBuf>,

    /// Episode publication date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Only consider episodes whose title contains this text
    #[arg(long)]
    pub title_contains: Option<String>,

    /// Working directory (default: <output_root>/<show>/<date>)
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Transcode target format
    #[arg(long)]
    pub fmt: Option<String>,

    /// ASR model
    #[arg(long)]
    pub model: Option<String>,

    /// ASR compute type
    #[arg(long)]
    pub compute: Option<String>,

    /// ASR provider
    #[arg(long)]
    pub asr_provider: Option<String>,

    /// Merge and normalize segments
    #[arg(long)]
    pub preprocess: bool,

    /// Restore punctuation and casing with the text model (implies --preprocess)
    #[arg(long)]
    pub restore: bool,

    /// Word-level alignment
    #[arg(long)]
    pub align: bool,

    /// Speaker diarization
    #[arg(long)]
    pub diarize: bool,

    /// AI analysis
    #[arg(long)]
    pub deepcast: bool,

    /// Analysis model
    #[arg(long)]
    pub deepcast_model: Option<String>,

    /// Analysis type
    #[arg(long)]
    pub deepcast_type: Option<String>,

    /// Publish the analysis to Notion
    #[arg(long)]
    pub notion: bool,

    /// Notion database id
    #[arg(long, env = "NOTION_DB_ID")]
    pub notion_db: Option<String>,

    /// Extra export formats (comma-separated, e.g. txt,srt)
    #[arg(long, value_delimiter = ',')]
    pub export_formats: Vec<String>,

    /// Remove intermediate files at the end
    #[arg(long)]
    pub clean: bool,

    /// Also remove the transcoded audio during cleanup
    #[arg(long)]
    pub no_keep_audio: bool,

    /// End the run after this step (e.g. fetch, transcribe, diarize)
    #[arg(long, value_parser = parse_step_kind)]
    pub stop_after: Option<PipelineStepKind>,

    /// Verbose step output (disables the elapsed-time spinner)
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Layer command-line options over the configured defaults
    pub fn apply_to(self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        config.source = if let Some(path) = self.episode {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read episode file: {}", path.display()))?;
            let episode: EpisodeMeta = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse episode file: {}", path.display()))?;
            Some(FetchSource::Preselected { episode })
        } else if let Some(url) = self.youtube_url {
            Some(FetchSource::Youtube { url })
        } else if self.show.is_some() || self.rss_url.is_some() {
            Some(FetchSource::Feed {
                show: self.show,
                rss_url: self.rss_url,
                date: self.date,
                title_contains: self.title_contains,
            })
        } else {
            config.source
        };

        if self.workdir.is_some() {
            config.workdir = self.workdir;
        }
        if let Some(fmt) = self.fmt {
            config.fmt = fmt;
        }
        if let Some(model) = self.model {
            config.asr_model = model;
        }
        if let Some(compute) = self.compute {
            config.compute = compute;
        }
        if self.asr_provider.is_some() {
            config.asr_provider = self.asr_provider;
        }

        config.preprocess |= self.preprocess || self.restore;
        config.preprocess_options.restore |= self.restore;
        config.align |= self.align;
        config.diarize |= self.diarize;
        config.deepcast |= self.deepcast;
        config.notion |= self.notion;
        config.clean |= self.clean;
        if self.no_keep_audio {
            config.keep_audio = false;
        }

        if let Some(model) = self.deepcast_model {
            config.deepcast_model = model;
        }
        if self.deepcast_type.is_some() {
            config.deepcast_type = self.deepcast_type;
        }
        if self.notion_db.is_some() {
            config.notion_db = self.notion_db;
        }
        if !self.export_formats.is_empty() {
            config.export_formats = self.export_formats;
        }
        if self.stop_after.is_some() {
            config.stop_after = self.stop_after;
        }

        Ok(config)
    }
}

fn parse_step_kind(value: &str) -> Result<PipelineStepKind, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_pipeline(args).await,
            Commands::Status { workdir } => show_status(&workdir),
            Commands::Config => show_config(),
        }
    }
}

async fn run_pipeline(args: RunArgs) -> Result<()> {
    let cfg = config::config()?;
    let verbose = args.verbose;
    let pipeline_config = args.apply_to(cfg.pipeline.clone())?;

    let runner = Arc::new(ProcessRunner::new());
    let shows = Arc::from(cfg.show_config()?);

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let orchestrator = Orchestrator::new(build_pipeline(runner, shows))
        .with_cancel_flag(cancel)
        .with_verbose(verbose);
    let progress =
        TracingProgress::new().with_elapsed(!verbose && std::io::stderr().is_terminal());

    let report = orchestrator.run(pipeline_config, &progress).await?;

    for (key, value) in report.results() {
        println!("{:<22} {}", key, value);
    }

    match &report.outcome {
        RunOutcome::Completed => {
            let skipped: Vec<&str> = report.skipped().collect();
            eprintln!(
                "\n[Run {} completed in {:.1}s; skipped: {}]",
                report.session_id,
                report.duration,
                if skipped.is_empty() {
                    "none".to_string()
                } else {
                    skipped.join(", ")
                }
            );
            for warning in &report.context.warnings {
                eprintln!("  warning: {}", warning);
            }
        }
        RunOutcome::Failed { step, error } => {
            eprintln!("\n[Run {} failed at {}: {}]", report.session_id, step, error);
            std::process::exit(1);
        }
        RunOutcome::Cancelled { next_step } => {
            eprintln!(
                "\n[Run {} cancelled before {}]",
                report.session_id,
                next_step.as_deref().unwrap_or("the first step")
            );
            std::process::exit(130);
        }
    }

    Ok(())
}

/// Show the state of a working directory
fn show_status(workdir: &Path) -> Result<()> {
    if !workdir.is_dir() {
        anyhow::bail!("Not a directory: {}", workdir.display());
    }

    let detector = ArtifactDetector::new(workdir);
    let detected = detector.completed_kinds();
    let state = RunState::load(workdir);

    println!("Working directory: {}", workdir.display());
    match state {
        Some(ref state) => {
            println!("Run state created: {}", state.created_at());
            println!("Run state updated: {}", state.updated_at());
        }
        None => println!("Run state: (none)"),
    }
    println!();
    println!("Steps:");
    for kind in PipelineStepKind::ALL {
        let recorded = state.as_ref().map(|s| s.is_completed(kind)).unwrap_or(false);
        let status = match (recorded, detected.contains(&kind)) {
            (_, true) => "done",
            (true, false) => "done (artifacts removed)",
            (false, false) => "-",
        };
        let artifact = detector
            .primary_artifact(kind)
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        println!("  {:<12} {:<26} {}", kind.as_str(), status, artifact);
    }

    if let Some(error) = state.as_ref().and_then(|s| s.metadata("last_error")) {
        if !error.is_null() {
            println!();
            println!("Last error: {}", error);
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("podx configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:        {}", cfg.home.display());
    println!("  Output root: {}", cfg.output_root.display());
    println!(
        "  Shows:       {}",
        cfg.shows_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!();
    println!("Pipeline defaults:");
    print!("{}", serde_yaml::to_string(&cfg.pipeline)?);

    Ok(())
}
