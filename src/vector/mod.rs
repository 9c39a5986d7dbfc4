//! Vector storage behind the similarity index.
//!
//! A namespace holds the vectors of exactly one index build. [`VectorStore::replace`] discards
//! whatever the namespace held before, so a rebuilt index never mixes vectors from two texts.

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::{QdrantError, QdrantVectorStore};

use crate::config::{Config, VectorBackend};
use async_trait::async_trait;
use thiserror::Error;

/// A chunk with its embedding, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// Ordinal of the chunk within its source text.
    pub position: usize,
    /// Chunk text returned on retrieval.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// A retrieved chunk and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Ordinal of the chunk within its source text.
    pub position: usize,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Errors returned by vector stores.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Query against a namespace that has never been built.
    #[error("Vector namespace '{0}' does not exist")]
    MissingNamespace(String),
    /// Query vector does not match the stored dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the stored vectors.
        expected: usize,
        /// Dimension of the supplied vector.
        actual: usize,
    },
    /// Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
}

/// Nearest-neighbour storage for chunk embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the contents of `namespace` with `chunks`.
    async fn replace(
        &self,
        namespace: &str,
        dimension: usize,
        chunks: Vec<IndexedChunk>,
    ) -> Result<(), VectorStoreError>;

    /// Return up to `limit` chunks of `namespace`, most similar first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Drop a namespace and its vectors. Missing namespaces are not an error.
    async fn remove(&self, namespace: &str) -> Result<(), VectorStoreError>;
}

/// Build the vector store selected by configuration.
pub fn get_vector_store(config: &Config) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match config.vector_backend {
        VectorBackend::Memory => Ok(Box::new(InMemoryVectorStore::new())),
        VectorBackend::Qdrant => {
            let url = config.qdrant_url.as_deref().ok_or_else(|| {
                QdrantError::InvalidUrl("QDRANT_URL is required for the Qdrant backend".into())
            })?;
            Ok(Box::new(QdrantVectorStore::new(
                url,
                config.qdrant_api_key.clone(),
                config.qdrant_collection_prefix.clone(),
            )?))
        }
    }
}
