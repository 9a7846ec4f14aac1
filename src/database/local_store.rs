use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::vector_db::{check_lengths, ScoredDocument, VectorDBError, VectorStore};
use crate::document::Document;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    document: Document,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    dimension: Option<usize>,
    chunks: Vec<StoredChunk>,
}

/// What the file will hold once a staged batch is committed; same layout as `Collection`.
#[derive(Serialize)]
struct CollectionView<'a> {
    dimension: Option<usize>,
    chunks: Vec<&'a StoredChunk>,
}

/// Vector store kept in a single JSON file under the persist directory.
/// Nothing leaves the machine.
pub struct LocalStore {
    path: PathBuf,
    collection: RwLock<Collection>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl LocalStore {
    /// Opens `<persist_dir>/<collection>.json`, starting empty when the file does not exist yet.
    pub fn open(persist_dir: &Path, collection: &str) -> Result<Self, VectorDBError> {
        let path = persist_dir.join(format!("{}.json", collection));
        let collection = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| VectorDBError::Persistence(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&raw)
                .map_err(|e| VectorDBError::Persistence(format!("{}: {}", path.display(), e)))?
        } else {
            Collection::default()
        };

        log::info!(
            "Opened local vector store {} with {} chunks",
            path.display(),
            collection.chunks.len()
        );
        Ok(Self {
            path,
            collection: RwLock::new(collection),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the collection file with `serialized` via a temporary file.
    async fn persist(&self, serialized: Vec<u8>) -> Result<(), VectorDBError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VectorDBError::Persistence(format!("{}: {}", parent.display(), e)))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized)
            .await
            .map_err(|e| VectorDBError::Persistence(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| VectorDBError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDBError> {
        let mut collection = self.collection.write();
        match collection.dimension {
            Some(expected) if expected != dimension => Err(VectorDBError::DimensionMismatch {
                expected,
                found: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                collection.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    async fn add_documents(
        &self,
        documents: &[Document],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, VectorDBError> {
        check_lengths(documents, &embeddings)?;
        if documents.is_empty() {
            return Ok(0);
        }

        let staged: Vec<StoredChunk> = documents
            .iter()
            .zip(embeddings)
            .map(|(document, embedding)| StoredChunk {
                id: Uuid::new_v4().to_string(),
                document: document.clone(),
                embedding,
            })
            .collect();

        // The batch only becomes visible once it is on disk.
        let (dimension, serialized) = {
            let collection = self.collection.read();
            let expected = collection.dimension.unwrap_or(staged[0].embedding.len());
            if let Some(bad) = staged.iter().find(|c| c.embedding.len() != expected) {
                return Err(VectorDBError::DimensionMismatch {
                    expected,
                    found: bad.embedding.len(),
                });
            }
            let view = CollectionView {
                dimension: Some(expected),
                chunks: collection.chunks.iter().chain(staged.iter()).collect(),
            };
            let serialized = serde_json::to_vec(&view).map_err(|e| VectorDBError::Persistence(e.to_string()))?;
            (expected, serialized)
        };

        self.persist(serialized).await?;

        let mut collection = self.collection.write();
        collection.dimension = Some(dimension);
        collection.chunks.extend(staged);
        Ok(documents.len())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, VectorDBError> {
        let collection = self.collection.read();
        if let Some(expected) = collection.dimension {
            if expected != query.len() {
                return Err(VectorDBError::DimensionMismatch {
                    expected,
                    found: query.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &StoredChunk)> = collection
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(query, &chunk.embedding), chunk))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| ScoredDocument {
                document: chunk.document.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, VectorDBError> {
        Ok(self.collection.read().chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("pumps fail", "/d/pumps.txt"),
            Document::new("valves leak", "/d/valves.txt"),
            Document::new("pipes corrode", "/d/pipes.txt"),
        ]
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "documents").unwrap();
        store.ensure_collection(2).await.unwrap();
        store
            .add_documents(&docs(), vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]])
            .await
            .unwrap();

        let hits = store.similarity_search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.source(), "/d/pumps.txt");
        assert_eq!(hits[1].document.source(), "/d/pipes.txt");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path(), "documents").unwrap();
            store
                .add_documents(&docs(), vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]])
                .await
                .unwrap();
        }
        let store = LocalStore::open(dir.path(), "documents").unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
        assert!(store.path().ends_with("documents.json"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "documents").unwrap();
        store.ensure_collection(3).await.unwrap();

        let err = store
            .add_documents(&docs()[..1], vec![vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDBError::DimensionMismatch { expected: 3, found: 2 }));
        assert!(store.ensure_collection(4).await.is_err());
        assert!(store.similarity_search(&[1.0], 4).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("DB");
        std::fs::write(&not_a_dir, "occupied").unwrap();

        let store = LocalStore::open(&not_a_dir, "documents").unwrap();
        let err = store
            .add_documents(&docs()[..1], vec![vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDBError::Persistence(_)));
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.similarity_search(&[1.0, 0.0], 4).await.unwrap().is_empty());

        // Once the directory is usable, only the new batch is written.
        std::fs::remove_file(&not_a_dir).unwrap();
        store
            .add_documents(&docs()[1..], vec![vec![0.0, 1.0], vec![0.7, 0.7]])
            .await
            .unwrap();
        let reopened = LocalStore::open(&not_a_dir, "documents").unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "documents").unwrap();
        let err = store.add_documents(&docs(), vec![vec![1.0]]).await.unwrap_err();
        assert!(matches!(err, VectorDBError::LengthMismatch { documents: 3, embeddings: 1 }));
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
