pub mod vector_db;
pub mod database;
pub mod local_store;
pub mod qdrant_config;
pub mod qdrant_store;

use std::sync::Arc;

use crate::config::{Settings, VectorBackend};

pub use database::{Database, DatabaseError, IngestedFile, LoggedExchange};
pub use local_store::LocalStore;
pub use qdrant_store::QdrantStore;
pub use vector_db::{ScoredDocument, VectorDBError, VectorStore};

/// The vector store selected by `settings.vector_backend`.
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn VectorStore>, VectorDBError> {
    match settings.vector_backend {
        VectorBackend::Local => Ok(Arc::new(LocalStore::open(
            &settings.persist_directory,
            &settings.collection_name,
        )?)),
        VectorBackend::Qdrant => Ok(Arc::new(
            QdrantStore::new(&settings.qdrant_url, &settings.collection_name).await?,
        )),
    }
}
