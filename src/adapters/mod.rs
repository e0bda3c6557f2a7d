//! Adapters for external operations.
//!
//! Everything the engine delegates (ASR, diarization, analysis, publishing,
//! LLM calls) crosses this boundary as a JSON-document-in, JSON-document-out
//! subprocess call.

pub mod command;
pub mod llm;

pub use command::{
    parse_document, render_command_line, CommandError, CommandRunner, Invocation, ProcessRunner,
};
pub use llm::{CommandTextModel, TextModel};
