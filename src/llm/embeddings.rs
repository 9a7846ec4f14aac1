use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::providers::traits::EmbeddingProvider;

const DEFAULT_CACHE_SIZE: usize = 256;

/// Wraps an embedding provider and remembers recent query embeddings, so a
/// repeated question does not hit the embedding server again.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_SIZE)
    }

    pub fn with_capacity(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_queries(&self) -> usize {
        self.query_cache.lock().len()
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let cached = self.query_cache.lock().get(text).cloned();
        if let Some(hit) = cached {
            log::debug!("Query embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.inner.embed_query(text).await?;
        self.query_cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn model_name(&self) -> String {
        self.inner.model_name()
    }
}
