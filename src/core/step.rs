//! The step contract every pipeline stage implements.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::PipelineStepKind;

use super::context::StepContext;
use super::progress::ProgressSink;

/// Step-level failures that are not external-operation errors
#[derive(Debug, Error)]
pub enum StepError {
    /// Required input is malformed or absent (fatal, never retried)
    #[error("{step}: {reason}")]
    Validation { step: String, reason: String },

    /// An upstream step did not leave what this step consumes
    #[error("{step}: missing {what} (did an earlier step run?)")]
    MissingInput { step: String, what: String },
}

impl StepError {
    pub fn validation(step: &str, reason: impl Into<String>) -> Self {
        StepError::Validation {
            step: step.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(step: &str, what: impl Into<String>) -> Self {
        StepError::MissingInput {
            step: step.to_string(),
            what: what.into(),
        }
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub message: String,
    /// Seconds; zero for skipped steps
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Degraded-but-recovered conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub skipped: bool,
}

impl StepResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            duration: 0.0,
            data: None,
            error: None,
            warnings: Vec::new(),
            skipped: false,
        }
    }

    pub fn fail(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            duration: 0.0,
            data: None,
            error: Some(error.into()),
            warnings: Vec::new(),
            skipped: false,
        }
    }

    /// Successful, zero-duration result for a step that was not executed
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::ok(reason)
        }
    }

    /// Attach a data entry
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }
}

/// A pipeline stage
///
/// Steps mutate the shared [`StepContext`] in place. A step that skips must
/// leave the context exactly as if it had executed (latest transcript loaded,
/// audio bookkeeping filled in), so downstream steps see the same state either
/// way.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Kinds this step satisfies under the current configuration
    fn kinds(&self, ctx: &StepContext) -> Vec<PipelineStepKind>;

    /// Whether the orchestrator should invoke this step at all
    fn is_enabled(&self, _ctx: &StepContext) -> bool {
        true
    }

    /// `Some(reason)` when prior output makes execution unnecessary
    async fn should_skip(&self, _ctx: &mut StepContext) -> Result<Option<String>> {
        Ok(None)
    }

    async fn execute(
        &self,
        ctx: &mut StepContext,
        progress: &dyn ProgressSink,
        verbose: bool,
    ) -> Result<StepResult>;
}
