//! Main orchestrator for pipeline execution.
//!
//! Runs the configured steps in order over one shared [`StepContext`],
//! skipping steps whose artifacts already exist, and persists the run state
//! after every step so an interrupted run resumes where it stopped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::PipelineStepKind;

use super::context::StepContext;
use super::progress::ProgressSink;
use super::run_state::RunState;
use super::step::{PipelineStep, StepResult};

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed { step: String, error: String },
    /// Stopped at a step boundary; `next_step` never started
    Cancelled { next_step: Option<String> },
}

/// One step's entry in the report
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub result: StepResult,
}

/// Final record of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: Uuid,
    pub outcome: RunOutcome,
    pub steps: Vec<StepRecord>,
    /// Completed kinds as persisted in the run state
    pub completed: BTreeSet<PipelineStepKind>,
    pub context: StepContext,
    /// Seconds
    pub duration: f64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn results(&self) -> &BTreeMap<String, String> {
        &self.context.results
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name).map(|s| &s.result)
    }

    pub fn executed(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| !s.result.skipped)
            .map(|s| s.name.as_str())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| s.result.skipped)
            .map(|s| s.name.as_str())
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    steps: Vec<Box<dyn PipelineStep>>,
    cancel: Arc<AtomicBool>,
    verbose: bool,
}

impl Orchestrator {
    /// Create an orchestrator over steps in execution order
    pub fn new(steps: Vec<Box<dyn PipelineStep>>) -> Self {
        Self {
            steps,
            cancel: Arc::new(AtomicBool::new(false)),
            verbose: false,
        }
    }

    /// Share a cancellation flag (checked before each step)
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Execute the pipeline
    ///
    /// Step failures end the run with [`RunOutcome::Failed`]; `Err` is only
    /// returned when the run state itself cannot be written.
    #[instrument(skip_all, fields(session_id = tracing::field::Empty))]
    pub async fn run(&self, config: PipelineConfig, progress: &dyn ProgressSink) -> Result<RunReport> {
        let session_id = Uuid::new_v4();
        tracing::Span::current().record("session_id", tracing::field::display(session_id));
        info!(steps = self.steps.len(), "Starting pipeline");

        let started = Instant::now();
        let mut ctx = StepContext::new(config);
        let mut state: Option<RunState> = None;
        let mut records = Vec::new();
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name().to_string();

            if self.cancel.load(Ordering::SeqCst) {
                warn!(next_step = %name, "Run cancelled");
                if let Some(ref mut state) = state {
                    state.set_metadata("cancelled_before", json!(name));
                    state.save()?;
                }
                return Ok(finish(
                    session_id,
                    RunOutcome::Cancelled {
                        next_step: Some(name),
                    },
                    records,
                    state,
                    ctx,
                    started,
                ));
            }

            if !step.is_enabled(&ctx) {
                debug!(step = %name, "Step disabled");
                continue;
            }

            progress.step_started(index, total, &name);
            open_state(&mut state, &ctx, session_id);

            let step_start = Instant::now();
            let outcome = match step.should_skip(&mut ctx).await {
                Ok(Some(reason)) => Ok(StepResult::skip(reason)),
                Ok(None) => step
                    .execute(&mut ctx, progress, self.verbose)
                    .await
                    .map(|result| result.with_duration(step_start.elapsed().as_secs_f64())),
                Err(e) => Err(e),
            };

            let result = match outcome {
                Ok(result) if result.success => result,
                Ok(result) => {
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| result.message.clone());
                    records.push(StepRecord {
                        name: name.clone(),
                        result,
                    });
                    return self.fail(session_id, name, error, records, state, ctx, started);
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    records.push(StepRecord {
                        name: name.clone(),
                        result: StepResult::fail(format!("{} failed", name), error.clone())
                            .with_duration(step_start.elapsed().as_secs_f64()),
                    });
                    return self.fail(session_id, name, error, records, state, ctx, started);
                }
            };

            ctx.warnings.extend(result.warnings.iter().cloned());
            progress.step_finished(&name, &result);

            // Fetch may only now know the working directory
            open_state(&mut state, &ctx, session_id);
            if let Some(ref mut state) = state {
                for kind in step.kinds(&ctx) {
                    state.mark_completed(kind);
                }
                state.set_metadata(
                    format!("step:{}", name),
                    json!({
                        "skipped": result.skipped,
                        "duration": result.duration,
                        "message": result.message,
                        "finished_at": Utc::now().to_rfc3339(),
                    }),
                );
                let detected = state.reconcile_with_detector();
                if !detected.is_empty() {
                    debug!(step = %name, ?detected, "Reconciled kinds found on disk");
                }
                state.save()?;
            }

            let stop_here = ctx
                .config
                .stop_after
                .is_some_and(|stop| step.kinds(&ctx).contains(&stop));
            records.push(StepRecord { name, result });

            if stop_here {
                info!(stop_after = ?ctx.config.stop_after, "Stopping after requested step");
                break;
            }
        }

        if let Some(ref mut state) = state {
            state.set_metadata("last_error", serde_json::Value::Null);
            state.set_metadata("finished_at", json!(Utc::now().to_rfc3339()));
            state.save()?;
        }

        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            warnings = ctx.warnings.len(),
            "Pipeline completed"
        );

        Ok(finish(
            session_id,
            RunOutcome::Completed,
            records,
            state,
            ctx,
            started,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        session_id: Uuid,
        step: String,
        error: String,
        records: Vec<StepRecord>,
        mut state: Option<RunState>,
        ctx: StepContext,
        started: Instant,
    ) -> Result<RunReport> {
        error!(step = %step, error = %error, "Step failed");

        if let Some(ref mut state) = state {
            state.set_metadata(
                "last_error",
                json!({
                    "step": step,
                    "error": error,
                    "at": Utc::now().to_rfc3339(),
                }),
            );
            state.save()?;
        }

        Ok(finish(
            session_id,
            RunOutcome::Failed { step, error },
            records,
            state,
            ctx,
            started,
        ))
    }
}

/// Load the run state once the working directory is known
fn open_state(state: &mut Option<RunState>, ctx: &StepContext, session_id: Uuid) {
    if state.is_some() {
        return;
    }
    let Some(ref dir) = ctx.working_dir else {
        return;
    };

    let mut loaded = RunState::load_or_new(dir);
    let detected = loaded.reconcile_with_detector();
    info!(
        working_dir = %dir.display(),
        completed = loaded.completed_steps().len(),
        detected = detected.len(),
        "Run state opened"
    );
    loaded.set_metadata("session_id", json!(session_id.to_string()));
    *state = Some(loaded);
}

fn finish(
    session_id: Uuid,
    outcome: RunOutcome,
    steps: Vec<StepRecord>,
    state: Option<RunState>,
    context: StepContext,
    started: Instant,
) -> RunReport {
    RunReport {
        session_id,
        outcome,
        steps,
        completed: state
            .map(|s| s.completed_steps().clone())
            .unwrap_or_default(),
        context,
        duration: started.elapsed().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::SilentProgress;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a marker file; skips when it exists
    struct MarkerStep {
        name: &'static str,
        kind: PipelineStepKind,
        file: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PipelineStep for MarkerStep {
        fn name(&self) -> &str {
            self.name
        }

        fn kinds(&self, _ctx: &StepContext) -> Vec<PipelineStepKind> {
            vec![self.kind]
        }

        async fn should_skip(&self, ctx: &mut StepContext) -> Result<Option<String>> {
            let dir = ctx.require_working_dir(self.name)?;
            Ok(dir
                .join(self.file)
                .exists()
                .then(|| format!("found {}", self.file)))
        }

        async fn execute(
            &self,
            ctx: &mut StepContext,
            _progress: &dyn ProgressSink,
            _verbose: bool,
        ) -> Result<StepResult> {
            self.calls.lock().unwrap().push(self.name.to_string());
            if self.fail {
                anyhow::bail!("boom");
            }
            let dir = ctx.require_working_dir(self.name)?.to_path_buf();
            std::fs::write(dir.join(self.file), "{}")?;
            Ok(StepResult::ok("wrote marker"))
        }
    }

    fn steps(calls: &Arc<Mutex<Vec<String>>>, fail_transcode: bool) -> Vec<Box<dyn PipelineStep>> {
        vec![
            Box::new(MarkerStep {
                name: "Fetch",
                kind: PipelineStepKind::Fetch,
                file: "episode-meta.json",
                fail: false,
                calls: Arc::clone(calls),
            }),
            Box::new(MarkerStep {
                name: "Transcode",
                kind: PipelineStepKind::Transcode,
                file: "audio-meta.json",
                fail: fail_transcode,
                calls: Arc::clone(calls),
            }),
        ]
    }

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            workdir: Some(PathBuf::from(dir.path())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_then_resume_skips() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let report = Orchestrator::new(steps(&calls, false))
            .run(config(&temp), &SilentProgress)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(calls.lock().unwrap().len(), 2);

        let report = Orchestrator::new(steps(&calls, false))
            .run(config(&temp), &SilentProgress)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(report.skipped().count(), 2);
        assert!(report.completed.contains(&PipelineStepKind::Transcode));
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let report = Orchestrator::new(steps(&calls, true))
            .run(config(&temp), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                step: "Transcode".to_string(),
                error: "boom".to_string()
            }
        );
        assert_eq!(
            report.completed.iter().copied().collect::<Vec<_>>(),
            vec![PipelineStepKind::Fetch]
        );

        let state = RunState::load(temp.path()).unwrap();
        assert_eq!(state.metadata("last_error").unwrap()["step"], "Transcode");
    }

    #[tokio::test]
    async fn test_stop_after_ends_run_early() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let config = PipelineConfig {
            stop_after: Some(PipelineStepKind::Fetch),
            ..config(&temp)
        };

        let report = Orchestrator::new(steps(&calls, true))
            .run(config, &SilentProgress)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(*calls.lock().unwrap(), vec!["Fetch".to_string()]);
        assert_eq!(report.steps.len(), 1);
        let state = RunState::load(temp.path()).unwrap();
        assert!(state.metadata("finished_at").is_some());
    }

    #[tokio::test]
    async fn test_cancel_before_first_step() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let cancel = Arc::new(AtomicBool::new(true));

        let report = Orchestrator::new(steps(&calls, false))
            .with_cancel_flag(cancel)
            .run(config(&temp), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Cancelled {
                next_step: Some("Fetch".to_string())
            }
        );
        assert!(calls.lock().unwrap().is_empty());
    }
}
