use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};
use async_openai::{
    types::{
        CreateEmbeddingRequestArgs,
        EmbeddingInput,
        CreateChatCompletionRequestArgs,
        ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent,
        Role,
    },
    Client,
    config::OpenAIConfig,
};
use std::env;

fn client_for(api_key: &str) -> Client<OpenAIConfig> {
    let mut config = OpenAIConfig::new().with_api_key(api_key.to_string());
    if let Ok(base) = env::var("OPENAI_API_BASE") {
        config = config.with_api_base(base);
    }
    Client::with_config(config)
}

/// Chat model used in place of the local LLM. Queries leave the machine.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: &str) -> Self {
        let chat_model = env::var("OPENAI_CHAT_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        Self {
            client: client_for(api_key),
            chat_model,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        // The rendered prompt already carries the system instructions.
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(vec![
                ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage {
                        role: Role::User,
                        content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                        name: None,
                    }
                ),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        response.choices.first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response content"))
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.chat_model.clone())
    }
}

#[derive(Clone)]
pub struct OpenAIEmbeddings {
    client: Client<OpenAIConfig>,
    embedding_model: String,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: &str) -> Self {
        let embedding_model = env::var("OPENAI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-ada-002".to_string());
        Self {
            client: client_for(api_key),
            embedding_model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} inputs",
                data.len(),
                texts.len()
            ));
        }
        data.sort_by_key(|embedding| embedding.index);
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        if let Some(embedding) = response.data.into_iter().next() {
            Ok(embedding.embedding)
        } else {
            Err(anyhow!("No embedding returned from OpenAI"))
        }
    }

    fn model_name(&self) -> String {
        self.embedding_model.clone()
    }
}
