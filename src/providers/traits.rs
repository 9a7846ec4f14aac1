use anyhow::Result;
use async_trait::async_trait;

/// Text generation backend: the prompt goes in whole, the answer comes back whole.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    async fn get_model_info(&self) -> Result<String>;
}

/// Embedding backend. Documents and queries are embedded separately because
/// instruction-tuned models prefix them differently.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> String;
}
