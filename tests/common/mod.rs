//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use podx::adapters::{render_command_line, CommandError, CommandRunner};

/// Command runner that replays canned documents keyed by program name and
/// records every invocation
#[derive(Default)]
pub struct FakeRunner {
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<Vec<String>>>,
    stdins: Mutex<Vec<Option<Value>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, program: &str, doc: Value) -> Self {
        self.responses.insert(program.to_string(), doc);
        self
    }

    /// Argument lists in invocation order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Program names in invocation order
    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|argv| argv[0].clone()).collect()
    }

    pub fn stdins(&self) -> Vec<Option<Value>> {
        self.stdins.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn invoke(
        &self,
        argv: &[String],
        stdin: Option<&Value>,
        save_raw_to: Option<&Path>,
    ) -> Result<Value, CommandError> {
        self.calls.lock().unwrap().push(argv.to_vec());
        self.stdins.lock().unwrap().push(stdin.cloned());

        let Some(doc) = self.responses.get(&argv[0]).cloned() else {
            return Err(CommandError::Failed {
                command: render_command_line(argv),
                code: 1,
                message: format!("{}: no such operation", argv[0]),
            });
        };

        if let Some(path) = save_raw_to {
            std::fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        }
        Ok(doc)
    }
}

pub fn episode_doc() -> Value {
    json!({
        "show": "Hard Fork",
        "episode_title": "The AI Week",
        "episode_published": "2024-05-03T10:00:00Z",
        "audio_path": "/tmp/hard-fork-source.mp3"
    })
}

pub fn audio_doc(dir: &Path) -> Value {
    json!({
        "audio_path": dir.join("audio.wav").display().to_string(),
        "sample_rate": 16000,
        "channels": 1,
        "format": "wav16"
    })
}

pub fn transcript_doc(texts: &[&str]) -> Value {
    let segments: Vec<Value> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            json!({
                "start": i as f64 * 5.0,
                "end": i as f64 * 5.0 + 4.0,
                "text": text
            })
        })
        .collect();
    json!({ "language": "en", "segments": segments })
}

pub fn diarized_doc(texts: &[&str]) -> Value {
    let mut doc = transcript_doc(texts);
    for (i, segment) in doc["segments"].as_array_mut().unwrap().iter_mut().enumerate() {
        segment["speaker"] = json!(format!("SPEAKER_{:02}", i % 2));
    }
    doc
}

/// Runner with responses for every operation of a default run
pub fn full_runner(dir: &Path) -> FakeRunner {
    FakeRunner::new()
        .respond("podx-fetch", episode_doc())
        .respond("podx-transcode", audio_doc(dir))
        .respond("podx-transcribe", transcript_doc(&["Hello there.", "Welcome back."]))
        .respond("podx-diarize", diarized_doc(&["Hello there.", "Welcome back."]))
        .respond("podx-align", transcript_doc(&["Hello there.", "Welcome back."]))
        .respond("podx-deepcast", json!({"summary": "Two hosts talk."}))
        .respond("podx-notion", json!({"url": "https://notion.so/page"}))
        .respond("podx-export", json!({"files": {"txt": "/tmp/x.txt"}}))
}
