//! Fetch: resolve episode metadata and the working directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::adapters::{CommandRunner, Invocation};
use crate::config::{FetchSource, ShowConfigSource};
use crate::core::detector::EPISODE_META_FILE;
use crate::core::{
    PipelineStep, ProgressSink, StepContext, StepError, StepResult, WorkdirIndex,
};
use crate::domain::{EpisodeMeta, PipelineStepKind};

const NAME: &str = "Fetch";

pub struct FetchStep {
    runner: Arc<dyn CommandRunner>,
    shows: Arc<dyn ShowConfigSource>,
}

impl FetchStep {
    pub fn new(runner: Arc<dyn CommandRunner>, shows: Arc<dyn ShowConfigSource>) -> Self {
        Self { runner, shows }
    }

    /// Make `meta` the run's episode: working dir, audio bookkeeping, show overrides
    fn adopt(&self, ctx: &mut StepContext, meta: EpisodeMeta, dir: PathBuf) {
        ctx.record_result("episode_meta", dir.join(EPISODE_META_FILE));
        ctx.working_dir = Some(dir);
        ctx.original_audio = meta.audio_path.as_deref().map(PathBuf::from);

        if let Some(overrides) = self.shows.overrides_for(&meta.show) {
            let changed = overrides.apply_to(&mut ctx.config);
            if !changed.is_empty() {
                info!(show = %meta.show, ?changed, "Applied show overrides");
                ctx.metadata
                    .insert("show_overrides".to_string(), json!(changed));
            }
        }

        ctx.episode = Some(meta);
    }

    /// Working directory for a freshly fetched episode
    fn working_dir_for(&self, ctx: &StepContext, meta: &EpisodeMeta) -> PathBuf {
        if let Some(ref dir) = ctx.working_dir {
            return dir.clone();
        }
        let requested_date = match ctx.config.source {
            Some(FetchSource::Feed { ref date, .. }) => date.clone(),
            _ => None,
        };
        let date = meta
            .published_date()
            .or(requested_date)
            .unwrap_or_else(|| "undated".to_string());
        ctx.config.episode_workdir(&meta.show, &date)
    }
}

#[async_trait]
impl PipelineStep for FetchStep {
    fn name(&self) -> &str {
        NAME
    }

    fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
        vec![PipelineStepKind::Fetch]
    }

    async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
        let Some(dir) = ctx.working_dir.clone() else {
            return Ok(None);
        };
        let path = dir.join(EPISODE_META_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let meta = EpisodeMeta::load(&path).await?;
        let reason = format!("found {} ({})", EPISODE_META_FILE, meta.episode_title);
        self.adopt(ctx, meta, dir);
        Ok(Some(reason))
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        _verbose: bool,
    ) -> Result<StepResult> {
        let source = ctx
            .config
            .source
            .clone()
            .ok_or_else(|| StepError::validation(NAME, "no episode source configured"))?;
        let commands = ctx.config.commands.clone();
        let outdir = ctx.working_dir.clone();
        let source_key = source.key();

        let meta = match source {
            FetchSource::Preselected { episode } => episode,
            FetchSource::Youtube { url } => {
                progress.message(&format!("Fetching video {}", url));
                let argv = Invocation::new(&commands.youtube)
                    .flag("--url", &url)
                    .flag_opt("--outdir", outdir.as_ref().map(|d| d.display()))
                    .into_argv();
                EpisodeMeta::from_value(self.runner.invoke(&argv, None, None).await?)?
            }
            FetchSource::Feed {
                show,
                rss_url,
                date,
                title_contains,
            } => {
                if show.is_none() && rss_url.is_none() {
                    return Err(StepError::validation(
                        NAME,
                        "feed search needs a show name or RSS URL",
                    )
                    .into());
                }
                progress.message(&format!(
                    "Searching feed for {}",
                    show.as_deref().or(rss_url.as_deref()).unwrap_or_default()
                ));
                let argv = Invocation::new(&commands.fetch)
                    .flag_opt("--show", show.as_ref())
                    .flag_opt("--rss-url", rss_url.as_ref())
                    .flag_opt("--date", date.as_ref())
                    .flag_opt("--title-contains", title_contains.as_ref())
                    .flag_opt("--outdir", outdir.as_ref().map(|d| d.display()))
                    .into_argv();
                EpisodeMeta::from_value(self.runner.invoke(&argv, None, None).await?)?
            }
        };

        let dir = self.working_dir_for(ctx, &meta);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(EPISODE_META_FILE);
        meta.save(&path).await?;

        if ctx.config.workdir.is_none() {
            let mut index = WorkdirIndex::load(&ctx.config.output_root);
            index.record(source_key, &dir);
            if let Err(e) = index.save() {
                warn!(error = %e, "Failed to record working directory, reruns will fetch again");
            }
        }

        let message = format!("Fetched '{}' ({})", meta.episode_title, meta.show);
        let show = meta.show.clone();
        self.adopt(ctx, meta, dir.clone());

        Ok(StepResult::ok(message)
            .with("episode_meta", path.display().to_string())
            .with("working_dir", dir.display().to_string())
            .with("show", show))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ProcessRunner;
    use crate::config::{NoShowConfig, PipelineConfig, ShowConfigFile};
    use crate::core::SilentProgress;
    use crate::steps::write_json;
    use tempfile::TempDir;

    fn episode() -> EpisodeMeta {
        EpisodeMeta {
            show: "Hard Fork".to_string(),
            episode_title: "AI Week".to_string(),
            episode_published: Some("2024-05-03T10:00:00Z".to_string()),
            audio_path: Some("/tmp/hard-fork.mp3".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_source_is_validation_error() {
        let step = FetchStep::new(Arc::new(ProcessRunner::new()), Arc::new(NoShowConfig));
        let mut ctx = StepContext::new(PipelineConfig::default());

        let err = step
            .execute(&mut ctx, &SilentProgress, false)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<StepError>().is_some());
    }

    #[tokio::test]
    async fn test_preselected_episode_derives_workdir() {
        let temp = TempDir::new().unwrap();
        let step = FetchStep::new(Arc::new(ProcessRunner::new()), Arc::new(NoShowConfig));
        let mut ctx = StepContext::new(PipelineConfig {
            output_root: temp.path().to_path_buf(),
            source: Some(FetchSource::Preselected { episode: episode() }),
            ..Default::default()
        });

        let expected = temp.path().join("hard-fork").join("2024-05-03");
        assert_eq!(ctx.working_dir.as_deref(), Some(expected.as_path()));
        assert!(step.should_skip(&mut ctx).await.unwrap().is_none());

        let result = step.execute(&mut ctx, &SilentProgress, false).await.unwrap();
        assert!(result.success);
        assert!(expected.join(EPISODE_META_FILE).is_file());
        assert_eq!(ctx.original_audio, Some(PathBuf::from("/tmp/hard-fork.mp3")));

        // Second time around the metadata is picked up from disk
        let mut again = StepContext::new(ctx.config.clone());
        assert!(step.should_skip(&mut again).await.unwrap().is_some());
        assert_eq!(again.episode, ctx.episode);
    }

    #[tokio::test]
    async fn test_show_overrides_apply_on_skip() {
        let temp = TempDir::new().unwrap();
        write_json(&temp.path().join(EPISODE_META_FILE), &episode())
            .await
            .unwrap();

        let shows = ShowConfigFile::from_yaml("shows:\n  hard fork:\n    diarize: true\n").unwrap();
        let step = FetchStep::new(Arc::new(ProcessRunner::new()), Arc::new(shows));
        let mut ctx = StepContext::new(PipelineConfig {
            workdir: Some(temp.path().to_path_buf()),
            ..Default::default()
        });

        assert!(step.should_skip(&mut ctx).await.unwrap().is_some());
        assert!(ctx.config.diarize);
        assert_eq!(ctx.metadata["show_overrides"], json!(["diarize"]));
    }
}
