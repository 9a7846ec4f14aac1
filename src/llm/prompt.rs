use std::collections::HashMap;
use thiserror::Error;

use super::memory::ConversationBufferMemory;

const B_INST: &str = "[INST]";
const E_INST: &str = "[/INST]";
const B_SYS: &str = "<<SYS>>\n";
const E_SYS: &str = "\n<</SYS>>\n\n";

const WITH_HISTORY: &str = "
Documents: ###
{context}
###

Chat History: ###
{history}
###

Question: ###
{question}
###";

const WITHOUT_HISTORY: &str = "
Documents: ###
{context}
###

Chat History: ###

###

Question: ###
{question}
###";

const HELPFUL_ANSWER: &str = "\n\nHelpful Answer:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Missing value for prompt variable {0}")]
    MissingVariable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptType {
    /// Llama-2 chat format with `[INST]` and `<<SYS>>` markers.
    Llama,
    Plain,
}

/// A template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let input_variables = placeholders(&template);
        Self {
            template,
            input_variables,
        }
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes every placeholder. Values are inserted verbatim, so braces
    /// inside documents or answers are never re-expanded.
    pub fn format(&self, values: &HashMap<&str, &str>) -> Result<String, PromptError> {
        for variable in &self.input_variables {
            if !values.contains_key(variable.as_str()) {
                return Err(PromptError::MissingVariable(variable.clone()));
            }
        }

        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) if is_identifier(&after[..end]) => {
                    let name = &after[..end];
                    out.push_str(values.get(name).copied().unwrap_or_default());
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if is_identifier(&after[..end]) => {
                let name = after[..end].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
                rest = &after[end + 1..];
            }
            _ => rest = after,
        }
    }
    names
}

/// Prompt and memory for a model family. Without `history` the chat history
/// section is left empty and the template takes only `context` and `question`.
pub fn get_prompt_template(
    system_prompt: &str,
    prompt_type: PromptType,
    history: bool,
) -> (PromptTemplate, ConversationBufferMemory) {
    let template = match (prompt_type, history) {
        (PromptType::Llama, true) => {
            format!("{}{}{}{}{}", B_INST, B_SYS, system_prompt, E_SYS, WITH_HISTORY) + E_INST
        }
        (PromptType::Llama, false) => format!(
            "{}{}{}{}{}{}{}",
            B_INST, B_SYS, system_prompt, E_SYS, WITHOUT_HISTORY, HELPFUL_ANSWER, E_INST
        ),
        (PromptType::Plain, true) => format!("{}\n{}{}", system_prompt, WITH_HISTORY, HELPFUL_ANSWER),
        (PromptType::Plain, false) => format!("{}\n{}{}", system_prompt, WITHOUT_HISTORY, HELPFUL_ANSWER),
    };

    (PromptTemplate::new(template), ConversationBufferMemory::new("question", "history"))
}
