use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::memory::ConversationBufferMemory;
use super::prompt::PromptTemplate;
use crate::database::VectorStore;
use crate::document::Document;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};

#[derive(Debug, Clone, Serialize)]
pub struct QaResult {
    pub result: String,
    pub source_documents: Vec<Document>,
}

/// Retrieval QA with the "stuff" strategy: every retrieved chunk goes into
/// one prompt, answered by a single completion.
#[derive(Clone)]
pub struct RetrievalQa {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn CompletionProvider>,
    prompt: PromptTemplate,
    memory: ConversationBufferMemory,
    k: usize,
    max_prompt_chars: Option<usize>,
}

impl RetrievalQa {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionProvider>,
        prompt: PromptTemplate,
        memory: ConversationBufferMemory,
        k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            prompt,
            memory,
            k: k.max(1),
            max_prompt_chars: None,
        }
    }

    /// Drops the oldest chat history whenever the rendered prompt would
    /// exceed `max_chars` characters. Documents and question are never cut.
    pub fn with_history_limit(mut self, max_chars: usize) -> Self {
        self.max_prompt_chars = Some(max_chars);
        self
    }

    /// A chain sharing this one's providers, store and limits, with no chat history.
    pub fn new_session(&self) -> Self {
        let mut session = self.clone();
        session.memory.clear();
        session
    }

    pub fn memory(&self) -> &ConversationBufferMemory {
        &self.memory
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<Document>> {
        let query = self.embedder.embed_query(question).await?;
        let hits = self.store.similarity_search(&query, self.k).await?;
        log::debug!(
            "Retrieved {} chunks (best score {:?})",
            hits.len(),
            hits.first().map(|hit| hit.score)
        );
        Ok(hits.into_iter().map(|hit| hit.document).collect())
    }

    pub fn render_prompt(&self, context: &str, question: &str) -> Result<String> {
        let history = self.memory.load_history();
        let prompt = self.render_with_history(context, question, &history)?;

        let limit = match self.max_prompt_chars {
            Some(limit) => limit,
            None => return Ok(prompt),
        };
        let extra = prompt.chars().count().saturating_sub(limit);
        if extra == 0 || history.is_empty() {
            return Ok(prompt);
        }

        let budget = history.chars().count().saturating_sub(extra);
        log::debug!("Prompt is {} characters over the limit, trimming history", extra);
        let trimmed = self.memory.truncated_history(budget);
        self.render_with_history(context, question, &trimmed)
    }

    fn render_with_history(&self, context: &str, question: &str, history: &str) -> Result<String> {
        let values = HashMap::from([
            ("context", context),
            (self.memory.memory_key(), history),
            (self.memory.input_key(), question),
        ]);
        Ok(self.prompt.format(&values)?)
    }

    pub async fn query(&mut self, question: &str) -> Result<QaResult> {
        let source_documents = self.retrieve(question).await?;
        let context = source_documents
            .iter()
            .map(|doc| doc.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.render_prompt(&context, question)?;
        let result = self.llm.complete(&prompt).await?;
        self.memory.save_context(question, &result);

        Ok(QaResult {
            result,
            source_documents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::LocalStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct KeywordEmbedder;

    // One dimension per keyword, so retrieval is predictable.
    fn keyword_vector(text: &str) -> Vec<f32> {
        ["pump", "valve", "pipe"]
            .iter()
            .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
            .collect()
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(keyword_vector(text))
        }

        fn model_name(&self) -> String {
            "keywords".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok(format!("answer {}", self.prompts.lock().len()))
        }

        async fn get_model_info(&self) -> Result<String> {
            Ok("recording".to_string())
        }
    }

    async fn chain(dir: &std::path::Path, llm: Arc<RecordingLlm>) -> RetrievalQa {
        let store = Arc::new(LocalStore::open(dir, "documents").unwrap());
        let docs = vec![
            Document::new("the pump needs priming", "/d/pump.txt"),
            Document::new("the valve sticks", "/d/valve.txt"),
        ];
        let embeddings = KeywordEmbedder
            .embed_documents(&docs.iter().map(|d| d.page_content.clone()).collect::<Vec<_>>())
            .await
            .unwrap();
        store.add_documents(&docs, embeddings).await.unwrap();

        RetrievalQa::new(
            Arc::new(KeywordEmbedder),
            store,
            llm,
            PromptTemplate::new("C[{context}] H[{history}] Q[{question}]"),
            ConversationBufferMemory::new("question", "history"),
            1,
        )
    }

    #[tokio::test]
    async fn test_query_stuffs_context_and_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingLlm::default());
        let mut qa = chain(dir.path(), llm.clone()).await;

        let first = qa.query("why does the pump fail?").await.unwrap();
        assert_eq!(first.result, "answer 1");
        assert_eq!(first.source_documents.len(), 1);
        assert_eq!(first.source_documents[0].source(), "/d/pump.txt");

        qa.query("and the valve?").await.unwrap();
        let prompts = llm.prompts.lock();
        assert_eq!(prompts[0], "C[the pump needs priming] H[] Q[why does the pump fail?]");
        assert_eq!(
            prompts[1],
            "C[the valve sticks] H[Human: why does the pump fail?\nAI: answer 1] Q[and the valve?]"
        );
    }

    #[tokio::test]
    async fn test_new_session_starts_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingLlm::default());
        let mut qa = chain(dir.path(), llm.clone()).await;
        qa.query("why does the pump fail?").await.unwrap();

        let mut session = qa.new_session();
        assert!(session.memory().is_empty());
        session.query("and the valve?").await.unwrap();

        assert_eq!(qa.memory().exchanges().len(), 1);
        assert_eq!(llm.prompts.lock()[1], "C[the valve sticks] H[] Q[and the valve?]");
    }

    #[tokio::test]
    async fn test_history_limit_trims_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingLlm::default());
        let mut qa = chain(dir.path(), llm.clone()).await.with_history_limit(60);

        qa.query("pump?").await.unwrap();
        qa.query("valve?").await.unwrap();
        qa.query("pump again?").await.unwrap();

        for prompt in llm.prompts.lock().iter() {
            assert!(prompt.chars().count() <= 60, "{}", prompt);
        }
        assert_eq!(qa.memory().exchanges().len(), 3);
    }
}
