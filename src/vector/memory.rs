//! In-process vector store using brute-force cosine similarity.

use super::{IndexedChunk, ScoredChunk, VectorStore, VectorStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Namespace {
    dimension: usize,
    chunks: Vec<IndexedChunk>,
}

/// Vector store keeping every namespace in a `HashMap` behind an async `RwLock`.
#[derive(Default)]
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine similarity; `0.0` when either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn replace(
        &self,
        namespace: &str,
        dimension: usize,
        chunks: Vec<IndexedChunk>,
    ) -> Result<(), VectorStoreError> {
        if let Some(bad) = chunks.iter().find(|chunk| chunk.vector.len() != dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }
        let count = chunks.len();
        let previous = self
            .namespaces
            .write()
            .await
            .insert(namespace.to_string(), Namespace { dimension, chunks });
        tracing::debug!(
            namespace,
            chunks = count,
            discarded = previous.map(|ns| ns.chunks.len()).unwrap_or(0),
            "In-memory namespace replaced"
        );
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        let stored = namespaces
            .get(namespace)
            .ok_or_else(|| VectorStoreError::MissingNamespace(namespace.to_string()))?;
        if vector.len() != stored.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: stored.dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = stored
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                position: chunk.position,
                text: chunk.text.clone(),
                score: cosine_similarity(&chunk.vector, vector),
            })
            .collect();

        // Stable sort: equal scores keep document order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn remove(&self, namespace: &str) -> Result<(), VectorStoreError> {
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(position: usize, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            position,
            text: format!("chunk {position}"),
            vector,
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_and_truncates() {
        let store = InMemoryVectorStore::new();
        store
            .replace(
                "s",
                2,
                vec![
                    chunk(0, vec![0.0, 1.0]),
                    chunk(1, vec![1.0, 0.0]),
                    chunk(2, vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("s", &[1.0, 0.1], 2).await.unwrap();
        let positions: Vec<_> = hits.iter().map(|hit| hit.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn ties_keep_document_order() {
        let store = InMemoryVectorStore::new();
        store
            .replace(
                "s",
                2,
                vec![chunk(0, vec![1.0, 0.0]), chunk(1, vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        let hits = store.query("s", &[1.0, 0.0], 3).await.unwrap();
        let positions: Vec<_> = hits.iter().map(|hit| hit.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[tokio::test]
    async fn replace_discards_previous_vectors() {
        let store = InMemoryVectorStore::new();
        store
            .replace("s", 2, vec![chunk(0, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace("s", 2, vec![chunk(7, vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = store.query("s", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 7);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = InMemoryVectorStore::new();
        store
            .replace("a", 2, vec![chunk(0, vec![1.0, 0.0])])
            .await
            .unwrap();
        store.remove("b").await.unwrap();

        assert!(matches!(
            store.query("b", &[1.0, 0.0], 3).await,
            Err(VectorStoreError::MissingNamespace(name)) if name == "b"
        ));
        assert_eq!(store.query("a", &[1.0, 0.0], 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = InMemoryVectorStore::new();
        assert!(matches!(
            store.replace("s", 3, vec![chunk(0, vec![1.0])]).await,
            Err(VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));

        store
            .replace("s", 2, vec![chunk(0, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(matches!(
            store.query("s", &[1.0, 0.0, 0.0], 1).await,
            Err(VectorStoreError::DimensionMismatch { .. })
        ));
    }
}
