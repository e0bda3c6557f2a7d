//! Text model adapter used by the batch transform engine.
//!
//! LLM calls go through the command invocation layer like every other
//! delegated operation: the request document `{model, system, prompt}` is fed
//! on stdin and the completion is read back from `text` (or raw stdout).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::command::{CommandRunner, Invocation};

/// A text completion backend
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model identifier (for logs and provenance)
    fn name(&self) -> &str;

    /// Complete `prompt` under the given system instructions
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Text model backed by an external `llm` operation
pub struct CommandTextModel {
    runner: Arc<dyn CommandRunner>,
    command: String,
    model: String,
}

impl CommandTextModel {
    pub fn new(runner: Arc<dyn CommandRunner>, command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            runner,
            command: command.into(),
            model: model.into(),
        }
    }
}

/// Pull the completion text out of an operation's response document
pub fn completion_text(doc: &Value) -> Option<String> {
    ["text", "content", "stdout"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| doc.as_str().map(str::to_string))
}

#[async_trait]
impl TextModel for CommandTextModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let argv = Invocation::new(&self.command)
            .flag("--model", &self.model)
            .into_argv();
        let request = json!({
            "model": self.model,
            "system": system,
            "prompt": prompt,
        });

        let response = self
            .runner
            .invoke(&argv, Some(&request), None)
            .await
            .with_context(|| format!("Text model '{}' call failed", self.model))?;

        completion_text(&response)
            .with_context(|| format!("Text model '{}' returned no text", self.model))
    }
}
