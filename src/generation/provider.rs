// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text generation provider interface and offline implementations.

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::embedding::provider::run_json_command;

/// Trait for answer generators.
pub trait GenerationProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Generates a completion for `prompt`, aiming at `max_length` characters.
    fn generate(&mut self, prompt: &str, max_length: usize) -> Result<String>;
}

/// Generator that shells out to an external process.
///
/// The command receives `{"model": ..., "prompt": ..., "max_length": ...}` on
/// stdin and must print `{"text": "..."}` on stdout.
pub struct CommandGenerator {
    command: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CommandCompletion {
    text: String,
}

impl CommandGenerator {
    pub fn new(command: String, model: String) -> Self {
        Self { command, model }
    }
}

impl GenerationProvider for CommandGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate(&mut self, prompt: &str, max_length: usize) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "max_length": max_length,
        });
        let output: CommandCompletion = run_json_command(&self.command, &payload)?;
        Ok(output.text)
    }
}

const CONTEXT_PREFIX: &str = "Context: ";
const QUESTION_MARKER: &str = "\n\nQuestion: ";
const ENTRY_HEADER: &str = "[Document ";

/// Offline generator that answers with the best matching chunk.
///
/// It reads the context block back out of the prompt and returns the text of
/// its first entry with the `[Document ...]` header removed.
#[derive(Debug, Default)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl GenerationProvider for ExtractiveGenerator {
    fn model_id(&self) -> &str {
        "extractive"
    }

    fn generate(&mut self, prompt: &str, _max_length: usize) -> Result<String> {
        let Some(context) = extract_context(prompt) else {
            bail!("prompt has no context block");
        };
        let answer = first_entry(context).trim();
        if answer.is_empty() {
            bail!("context is empty");
        }
        Ok(answer.to_string())
    }
}

fn extract_context(prompt: &str) -> Option<&str> {
    let rest = prompt.strip_prefix(CONTEXT_PREFIX)?;
    let end = rest.rfind(QUESTION_MARKER)?;
    Some(&rest[..end])
}

fn first_entry(context: &str) -> &str {
    if !context.starts_with(ENTRY_HEADER) {
        return context;
    }
    let body = match context.split_once('\n') {
        Some((_, body)) => body,
        None => return "",
    };
    let separator = format!("\n\n{}", ENTRY_HEADER);
    match body.find(&separator) {
        Some(end) => &body[..end],
        None => body,
    }
}
