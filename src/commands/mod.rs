use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::collections::VecDeque;
use std::env;
use std::sync::Arc;

use crate::config::{DeviceType, Settings};
use crate::llm::CachedEmbedder;
use crate::providers::local::InstructEmbeddings;
use crate::providers::openai::OpenAIEmbeddings;
use crate::providers::traits::EmbeddingProvider;

pub mod ingest;
pub mod manifest;
pub mod query;
pub mod system;

/// Where interactive answers come from. `None` means the input was closed.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

pub struct Terminal {
    editor: Editor<(), DefaultHistory>,
}

impl Terminal {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: Editor::<(), DefaultHistory>::new()?,
        })
    }
}

impl LineSource for Terminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                    log::warn!("Failed to add history entry: {}", e);
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                Ok(None)
            }
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(anyhow!("Failed to read input: {}", err)),
        }
    }
}

/// Answers read from a fixed script, for tests and piped input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
    pub prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

/// Reads one answer, treating closed input as an error.
pub fn ask(input: &mut dyn LineSource, prompt: &str) -> Result<String> {
    input
        .read_line(prompt)?
        .map(|line| line.trim().to_string())
        .ok_or_else(|| anyhow!("Input closed while waiting for: {}", prompt.trim()))
}

/// Asks until the answer is `y` or `n`.
pub fn ask_yes_no(input: &mut dyn LineSource, prompt: &str) -> Result<bool> {
    loop {
        match ask(input, prompt)?.as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => continue,
        }
    }
}

/// `OPENAI_API_KEY`, or a key typed in at the prompt.
pub fn openai_api_key(input: &mut dyn LineSource) -> Result<String> {
    match env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => {
            let key = ask(input, "Please provide a valid OpenAI API key: ")?;
            if key.is_empty() {
                return Err(anyhow!("An OpenAI API key is required with --openai"));
            }
            Ok(key)
        }
    }
}

/// The embedding backend for ingest and queries, wrapped in the query cache.
pub fn embedder(
    settings: &Settings,
    device_type: DeviceType,
    openai_key: Option<&str>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let inner: Arc<dyn EmbeddingProvider> = match openai_key {
        Some(key) => {
            log::info!("Using OpenAI embedding model, your documents are NOT local");
            Arc::new(OpenAIEmbeddings::new(key))
        }
        None => {
            log::info!("Using InstructEmbeddings, your documents are local");
            Arc::new(InstructEmbeddings::new(
                &settings.embedding_url,
                &settings.embedding_model_name,
                device_type,
            )?)
        }
    };
    Ok(Arc::new(CachedEmbedder::new(inner)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no_repeats_until_valid() {
        let mut input = ScriptedInput::new(["maybe", "Y", "n"]);
        assert!(!ask_yes_no(&mut input, "Show sources (y/n): ").unwrap());
        assert_eq!(input.prompts.len(), 3);
    }

    #[test]
    fn test_closed_input_is_an_error() {
        let mut input = ScriptedInput::new(Vec::<String>::new());
        assert!(ask(&mut input, "Model ID: ").is_err());
    }
}
