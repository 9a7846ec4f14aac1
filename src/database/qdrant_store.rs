use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        Distance, PointStruct, SearchPoints,
        VectorParams, Value,
        value::Kind,
        with_payload_selector::SelectorOptions, WithPayloadSelector,
        point_id::PointIdOptions,
        PointId,
        CreateCollection, VectorsConfig, CountPoints,
        UpsertPoints,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::qdrant_config::create_qdrant_client;
use super::vector_db::{check_lengths, ScoredDocument, VectorDBError, VectorStore};
use crate::document::Document;

const CONTENT_KEY: &str = "page_content";
const UPSERT_BATCH: usize = 256;

/// Chunks as points in a Qdrant collection. Metadata entries become
/// top-level string payload fields next to the chunk text.
#[derive(Clone)]
pub struct QdrantStore {
    client: Arc<Qdrant>,
    collection: String,
}

fn to_payload(document: &Document) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = document
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect();
    payload.insert(CONTENT_KEY.to_string(), Value::from(document.page_content.clone()));
    payload
}

fn from_payload(payload: HashMap<String, Value>) -> Document {
    let mut page_content = String::new();
    let mut metadata = HashMap::new();
    for (key, value) in payload {
        let text = match value.kind {
            Some(Kind::StringValue(s)) => s,
            Some(Kind::IntegerValue(i)) => i.to_string(),
            Some(Kind::DoubleValue(d)) => d.to_string(),
            Some(Kind::BoolValue(b)) => b.to_string(),
            _ => continue,
        };
        if key == CONTENT_KEY {
            page_content = text;
        } else {
            metadata.insert(key, text);
        }
    }
    Document {
        page_content,
        metadata,
    }
}

impl QdrantStore {
    pub async fn new(url: &str, collection: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url).await?;
        Ok(Self {
            client: Arc::new(client),
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDBError> {
        let vectors_config = VectorParams {
            size: dimension as u64,
            distance: Distance::Cosine.into(),
            ..Default::default()
        };

        let vectors_config = VectorsConfig {
            config: Some(qdrant_client::qdrant::vectors_config::Config::Params(vectors_config)),
        };

        let create_collection = CreateCollection {
            collection_name: self.collection.clone(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("AlreadyExists") || e.to_string().contains("already exists") => {
                log::info!("Collection {} already exists, skipping creation", self.collection);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    async fn add_documents(
        &self,
        documents: &[Document],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, VectorDBError> {
        check_lengths(documents, &embeddings)?;

        let points: Vec<PointStruct> = documents
            .iter()
            .zip(embeddings)
            .map(|(document, vector)| PointStruct {
                id: Some(PointId {
                    point_id_options: Some(PointIdOptions::Uuid(Uuid::new_v4().to_string())),
                }),
                vectors: Some(vector.into()),
                payload: to_payload(document),
            })
            .collect();

        for batch in points.chunks(UPSERT_BATCH) {
            let upsert_points = UpsertPoints {
                collection_name: self.collection.clone(),
                wait: Some(true),
                points: batch.to_vec(),
                ..Default::default()
            };

            self.client.upsert_points(upsert_points)
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        }

        Ok(documents.len())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, VectorDBError> {
        let request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query.to_vec(),
            limit: k as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self.client.search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(results.result
            .into_iter()
            .map(|point| ScoredDocument {
                score: point.score,
                document: from_payload(point.payload),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, VectorDBError> {
        let request = CountPoints {
            collection_name: self.collection.clone(),
            exact: Some(true),
            ..Default::default()
        };

        let response = self.client.count(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip_keeps_metadata() {
        let mut document = Document::new("Redundancy raises availability.", "/docs/ha.md");
        document.metadata.insert("page".to_string(), "3".to_string());

        let payload = to_payload(&document);
        assert_eq!(payload.len(), 3);
        assert_eq!(from_payload(payload), document);
    }
}
