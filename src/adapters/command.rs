//! Command invocation layer.
//!
//! Every delegated operation (fetch, transcode, transcribe, diarize, deepcast,
//! notion, ...) is an external executable that reads zero or one JSON document
//! on stdin and writes one document to stdout. A non-zero exit status means
//! failure; the error text is taken from stderr (or stdout if stderr is empty).

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinError;
use tracing::debug;

/// Errors raised by the command invocation layer
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Empty command line")]
    EmptyCommand,

    /// The tool could not be started at all
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and reported an error
    #[error("`{command}` failed with exit code {code}: {message}")]
    Failed {
        command: String,
        code: i32,
        message: String,
    },

    #[error("Failed to encode stdin document for `{command}`: {source}")]
    Encode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error while {action} for `{command}`: {source}")]
    Io {
        command: String,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Rendered command line the error refers to (if any)
    pub fn command(&self) -> Option<&str> {
        match self {
            CommandError::EmptyCommand => None,
            CommandError::Spawn { command, .. }
            | CommandError::Failed { command, .. }
            | CommandError::Encode { command, .. }
            | CommandError::Io { command, .. } => Some(command),
        }
    }
}

/// Argument list builder for an external operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    argv: Vec<String>,
}

impl Invocation {
    /// Start from a configured command, which may carry its own leading args
    /// (e.g. `"python -m podx.transcribe"`)
    pub fn new(command: &str) -> Self {
        Self {
            argv: command.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Append `--name value`
    pub fn flag(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.argv.push(name.to_string());
        self.argv.push(value.to_string());
        self
    }

    /// Append `--name value` when the value is present
    pub fn flag_opt<T: fmt::Display>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.flag(name, v),
            None => self,
        }
    }

    pub fn into_argv(self) -> Vec<String> {
        self.argv
    }
}

/// Render an argument list the way a user would type it
pub fn render_command_line(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() {
                "''".to_string()
            } else if arg.chars().any(|c| c.is_whitespace() || "'\"$`\\;&|<>".contains(c)) {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse operation stdout as JSON, wrapping plain text as `{"stdout": text}`
pub fn parse_document(stdout: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(stdout) {
        Ok(value) => value,
        Err(_) => json!({ "stdout": String::from_utf8_lossy(stdout).trim_end() }),
    }
}

/// Uniform interface for running delegated operations
///
/// Implementations may be swapped for in-process calls (or test fakes)
/// without changing the orchestration contract.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv`, feed `stdin` as JSON, return the parsed stdout document.
    /// When `save_raw_to` is given the raw stdout is also written there.
    async fn invoke(
        &self,
        argv: &[String],
        stdin: Option<&Value>,
        save_raw_to: Option<&Path>,
    ) -> Result<Value, CommandError>;
}

/// Runs operations as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Outcome of the stdin writer task; a panicked or cancelled writer is an I/O error
fn writer_result(joined: Result<std::io::Result<()>, JoinError>) -> std::io::Result<()> {
    joined.unwrap_or_else(|e| Err(std::io::Error::other(e)))
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn invoke(
        &self,
        argv: &[String],
        stdin: Option<&Value>,
        save_raw_to: Option<&Path>,
    ) -> Result<Value, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::EmptyCommand)?;
        let command = render_command_line(argv);
        debug!(%command, "Invoking external operation");

        let payload = stdin
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|source| CommandError::Encode {
                command: command.clone(),
                source,
            })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(if payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Feed stdin concurrently so a chatty child cannot deadlock on a full pipe
        let writer = match (payload, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => Some(tokio::spawn(async move {
                pipe.write_all(&bytes).await?;
                pipe.shutdown().await
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CommandError::Io {
                command: command.clone(),
                action: "waiting for the process",
                source,
            })?;

        let write_result = match writer {
            Some(handle) => writer_result(handle.await),
            None => Ok(()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(CommandError::Failed {
                command,
                code: output.status.code().unwrap_or(-1),
                message,
            });
        }

        // A tool that exits cleanly without reading stdin is not an error
        if let Err(source) = write_result {
            if source.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(CommandError::Io {
                    command,
                    action: "writing stdin",
                    source,
                });
            }
        }

        if let Some(path) = save_raw_to {
            tokio::fs::write(path, &output.stdout)
                .await
                .map_err(|source| CommandError::Io {
                    command: command.clone(),
                    action: "saving raw output",
                    source,
                })?;
        }

        Ok(parse_document(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("python -m podx.transcribe")
            .flag("--model", "large-v3")
            .flag_opt("--compute", None::<&str>)
            .flag_opt("--asr-provider", Some("local"));

        assert_eq!(
            inv.into_argv(),
            &["python", "-m", "podx.transcribe", "--model", "large-v3", "--asr-provider", "local"]
        );
    }

    #[test]
    fn test_render_command_line_quotes() {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo it's here".to_string(),
        ];
        assert_eq!(render_command_line(&argv), r"sh -c 'echo it'\''s here'");
    }

    #[test]
    fn test_parse_document_wraps_text() {
        assert_eq!(parse_document(br#"{"ok": true}"#), json!({"ok": true}));
        assert_eq!(
            parse_document(b"Published to Notion\n"),
            json!({"stdout": "Published to Notion"})
        );
        assert_eq!(parse_document(b""), json!({"stdout": ""}));
    }

    #[tokio::test]
    async fn test_panicked_writer_is_io_error() {
        let handle: tokio::task::JoinHandle<std::io::Result<()>> =
            tokio::spawn(async { panic!("stdin writer died") });
        let joined = handle.await;
        let err = writer_result(joined).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
        assert!(writer_result(Ok(Ok(()))).is_ok());
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        let runner = ProcessRunner::new();
        let result = runner.invoke(&[], None, None).await;
        assert!(matches!(result, Err(CommandError::EmptyCommand)));
    }
}
