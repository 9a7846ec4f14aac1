use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

use super::{ask, ask_yes_no, embedder, openai_api_key, LineSource};
use crate::config::{DeviceType, Settings, TEMPLATE};
use crate::database::{open_store, Database};
use crate::document::Document;
use crate::llm::{ConversationBufferMemory, PromptTemplate, QaResult, RetrievalQa};
use crate::providers::openai::OpenAIProvider;
use crate::providers::traits::CompletionProvider;
use crate::providers::load_model;

const SOURCES_BANNER: &str = "----------------------------------SOURCE DOCUMENTS---------------------------";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub device_type: DeviceType,
    pub openai: bool,
    pub max_length: usize,
    pub show_sources: bool,
    pub model_id: Option<String>,
    pub model_basename: Option<String>,
    /// Drop the oldest chat history so prompts stay within `max_length` characters.
    pub truncate_history: bool,
}

/// `"None"` (or nothing) means the model has no basename.
pub fn parse_basename(answer: &str) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() || answer == "None" {
        None
    } else {
        Some(answer.to_string())
    }
}

/// Model id and basename from the flags, or from the user when no flag was given.
pub fn choose_model(
    settings: &Settings,
    options: &RunOptions,
    input: &mut dyn LineSource,
) -> Result<(String, Option<String>)> {
    if options.model_id.is_some() || options.model_basename.is_some() {
        let model_id = options.model_id.clone().unwrap_or_else(|| settings.model_id.clone());
        let basename = match &options.model_basename {
            Some(name) => parse_basename(name),
            None => settings.model_basename.clone(),
        };
        return Ok((model_id, basename));
    }

    let shown_basename = settings.model_basename.as_deref().unwrap_or("None");
    let prompt = format!(
        "Use default model id and basename\n{}\n{}\n(y/n)? ",
        settings.model_id, shown_basename
    );
    let answer = ask(input, &prompt)?;
    if answer == "y" || answer == "Y" {
        return Ok((settings.model_id.clone(), settings.model_basename.clone()));
    }

    let model_id = ask(input, "Model ID: ")?;
    let basename = ask(input, "Model basename: ")?;
    Ok((model_id, parse_basename(&basename)))
}

pub fn format_answer(question: &str, result: &QaResult, show_sources: bool) -> String {
    let mut out = format!("\n\n> Question:\n{}\n\n> Answer:\n{}\n", question, result.result);
    if show_sources {
        out.push_str(&format_sources(&result.source_documents));
    }
    out
}

fn format_sources(documents: &[Document]) -> String {
    let mut out = format!("\n{}\n", SOURCES_BANNER);
    for document in documents {
        out.push_str(&format!("\n> {}:\n{}\n", document.source(), document.page_content));
    }
    out.push_str(SOURCES_BANNER);
    out.push('\n');
    out
}

/// Answers queries until `exit` or closed input.
pub async fn interactive_loop(
    qa: &mut RetrievalQa,
    input: &mut dyn LineSource,
    show_sources: bool,
    ledger: Option<&Database>,
) -> Result<usize> {
    let mut answered = 0;
    loop {
        let query = match input.read_line("\nEnter a query: ")? {
            Some(line) => line.trim().to_string(),
            None => break,
        };
        if query == "exit" {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let result = match qa.query(&query).await {
            Ok(result) => result,
            Err(e) => {
                println!("{}", format!("Failed to answer: {}", e).red());
                continue;
            }
        };
        answered += 1;
        print!("{}", format_answer(&query, &result, show_sources));

        if let Some(ledger) = ledger {
            let sources = result
                .source_documents
                .iter()
                .map(|doc| doc.source().to_string())
                .collect();
            if let Err(e) = ledger.log_exchange(query.clone(), result.result.clone(), sources).await {
                log::warn!("Failed to log exchange: {}", e);
            }
        }
    }
    Ok(answered)
}

/// Embeddings, store and model wired into a QA chain for the `run` and `serve` commands.
pub async fn build_chain(
    settings: &Settings,
    device_type: DeviceType,
    max_length: usize,
    openai_key: Option<&str>,
    model: (String, Option<String>),
) -> Result<RetrievalQa> {
    let embeddings = embedder(settings, device_type, openai_key)?;
    let store = open_store(settings).await?;

    let llm: Arc<dyn CompletionProvider> = match openai_key {
        Some(key) => {
            log::info!("Using OpenAI models, your queries are NOT local");
            Arc::new(OpenAIProvider::new(key))
        }
        None => {
            let (model_id, model_basename) = model;
            Arc::new(load_model(
                &settings.local_llm_url,
                device_type,
                &model_id,
                max_length,
                model_basename.as_deref(),
            )?)
        }
    };

    let prompt = PromptTemplate::new(TEMPLATE);
    let memory = ConversationBufferMemory::new("question", "history");
    Ok(RetrievalQa::new(embeddings, store, llm, prompt, memory, settings.retriever_k))
}

pub async fn run(settings: &Settings, options: RunOptions, input: &mut dyn LineSource) -> Result<()> {
    let show_sources = options.show_sources || ask_yes_no(input, "Show sources (y/n): ")?;

    let openai_key = if options.openai {
        Some(openai_api_key(input)?)
    } else {
        None
    };

    let model = if options.openai {
        (settings.model_id.clone(), settings.model_basename.clone())
    } else {
        let (model_id, model_basename) = choose_model(settings, &options, input)?;
        log::info!("Running on: {}", options.device_type);
        log::info!("Display Source Documents set to: {}", show_sources);
        log::info!("Model ID: {}", model_id);
        log::info!("Model basename: {}", model_basename.as_deref().unwrap_or("None"));
        (model_id, model_basename)
    };

    let mut qa = build_chain(
        settings,
        options.device_type,
        options.max_length,
        openai_key.as_deref(),
        model,
    )
    .await?;
    if options.truncate_history {
        qa = qa.with_history_limit(options.max_length);
    }
    let ledger = Database::new(settings.ledger_path()).await?;

    super::system::print_banner("run", settings);
    super::system::print_query_help();
    interactive_loop(&mut qa, input, show_sources, Some(&ledger)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ScriptedInput;

    fn options() -> RunOptions {
        RunOptions {
            device_type: DeviceType::Cpu,
            openai: false,
            max_length: 2048,
            show_sources: false,
            model_id: None,
            model_basename: None,
            truncate_history: false,
        }
    }

    #[test]
    fn test_parse_basename() {
        assert_eq!(parse_basename("None"), None);
        assert_eq!(parse_basename(" "), None);
        assert_eq!(parse_basename("model.safetensors").as_deref(), Some("model.safetensors"));
    }

    #[test]
    fn test_choose_default_model() {
        let settings = Settings::with_root("/tmp/docqa");
        let mut input = ScriptedInput::new(["Y"]);
        let (model_id, basename) = choose_model(&settings, &options(), &mut input).unwrap();
        assert_eq!(model_id, "TheBloke/orca_mini_v3_13B-GPTQ");
        assert_eq!(basename.as_deref(), Some("model.safetensors"));
        assert!(input.prompts[0].contains("TheBloke/orca_mini_v3_13B-GPTQ\nmodel.safetensors\n(y/n)? "));
    }

    #[test]
    fn test_choose_custom_model() {
        let settings = Settings::with_root("/tmp/docqa");
        let mut input = ScriptedInput::new(["n", "TheBloke/vicuna-7B-1.1-HF", "None"]);
        let (model_id, basename) = choose_model(&settings, &options(), &mut input).unwrap();
        assert_eq!(model_id, "TheBloke/vicuna-7B-1.1-HF");
        assert_eq!(basename, None);
    }

    #[test]
    fn test_flags_skip_the_prompt() {
        let settings = Settings::with_root("/tmp/docqa");
        let mut opts = options();
        opts.model_basename = Some("llama-2-7b-chat.ggmlv3.q4_0.bin".to_string());
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let (model_id, basename) = choose_model(&settings, &opts, &mut input).unwrap();
        assert_eq!(model_id, settings.model_id);
        assert_eq!(basename.as_deref(), Some("llama-2-7b-chat.ggmlv3.q4_0.bin"));
        assert!(input.prompts.is_empty());
    }

    #[test]
    fn test_format_answer_with_sources() {
        let result = QaResult {
            result: "Use redundancy.".to_string(),
            source_documents: vec![Document::new("Redundant pumps.", "/d/pumps.txt")],
        };
        let plain = format_answer("How to raise availability?", &result, false);
        assert_eq!(plain, "\n\n> Question:\nHow to raise availability?\n\n> Answer:\nUse redundancy.\n");

        let with_sources = format_answer("How to raise availability?", &result, true);
        assert!(with_sources.contains("\n> /d/pumps.txt:\nRedundant pumps.\n"));
        assert_eq!(with_sources.matches("SOURCE DOCUMENTS").count(), 2);
    }
}
