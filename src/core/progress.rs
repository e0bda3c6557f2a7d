//! Progress reporting for a run.
//!
//! Steps report through a [`ProgressSink`] so the engine never prints
//! directly. Long external operations can show an elapsed-time spinner; it
//! ticks on indicatif's own thread and only reads the clock.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{info, warn};

use super::step::StepResult;

/// Receives progress notifications from the orchestrator and steps
pub trait ProgressSink: Send + Sync {
    fn step_started(&self, index: usize, total: usize, name: &str);

    fn step_finished(&self, name: &str, result: &StepResult);

    /// Free-form progress line from inside a step
    fn message(&self, text: &str);

    /// Elapsed-time display for a long operation; dropped when it finishes
    fn elapsed(&self, _label: &str) -> Option<ElapsedTicker> {
        None
    }
}

/// Reports progress as tracing events
#[derive(Debug, Clone, Default)]
pub struct TracingProgress {
    show_elapsed: bool,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also show an elapsed-time spinner on stderr for long operations
    pub fn with_elapsed(mut self, enabled: bool) -> Self {
        self.show_elapsed = enabled;
        self
    }
}

impl ProgressSink for TracingProgress {
    fn step_started(&self, index: usize, total: usize, name: &str) {
        info!(step = %name, "[{}/{}] {}", index + 1, total, name);
    }

    fn step_finished(&self, name: &str, result: &StepResult) {
        for warning in &result.warnings {
            warn!(step = %name, "{}", warning);
        }
        if result.skipped {
            info!(step = %name, reason = %result.message, "Skipped");
        } else if result.success {
            info!(
                step = %name,
                duration_ms = (result.duration * 1000.0) as u64,
                "{}",
                result.message
            );
        }
    }

    fn message(&self, text: &str) {
        info!("{}", text);
    }

    fn elapsed(&self, label: &str) -> Option<ElapsedTicker> {
        self.show_elapsed.then(|| ElapsedTicker::start(label))
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn step_started(&self, _index: usize, _total: usize, _name: &str) {}
    fn step_finished(&self, _name: &str, _result: &StepResult) {}
    fn message(&self, _text: &str) {}
}

/// Spinner with elapsed seconds; cleared on drop
pub struct ElapsedTicker {
    bar: ProgressBar,
}

impl ElapsedTicker {
    pub fn start(label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}
