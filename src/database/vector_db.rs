use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("Embedding dimension mismatch: collection has {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Got {embeddings} embeddings for {documents} documents")]
    LengthMismatch { documents: usize, embeddings: usize },
    #[error("Persistence error: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Storage for embedded chunks, searched by cosine similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection for `dimension`-sized vectors if it is missing.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDBError>;

    /// Stores `documents[i]` under `embeddings[i]`, returning how many were added.
    async fn add_documents(
        &self,
        documents: &[Document],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, VectorDBError>;

    /// The `k` stored chunks closest to `query`, best first.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, VectorDBError>;

    async fn count(&self) -> Result<usize, VectorDBError>;
}

pub fn check_lengths(documents: &[Document], embeddings: &[Vec<f32>]) -> Result<(), VectorDBError> {
    if documents.len() != embeddings.len() {
        return Err(VectorDBError::LengthMismatch {
            documents: documents.len(),
            embeddings: embeddings.len(),
        });
    }
    Ok(())
}
