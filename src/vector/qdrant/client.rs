//! Vector store backed by one Qdrant collection per namespace.

use super::types::{QdrantError, QueryResponse, QueryResponseResult};
use crate::vector::{IndexedChunk, ScoredChunk, VectorStore, VectorStoreError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Lightweight HTTP client storing chunk vectors in Qdrant.
pub struct QdrantVectorStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection_prefix: String,
}

impl QdrantVectorStore {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection_prefix: String,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("rusty-docqa/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            prefix = %collection_prefix,
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection_prefix,
        })
    }

    fn collection_name(&self, namespace: &str) -> String {
        format!("{}-{namespace}", self.collection_prefix)
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection}"))
            .send()
            .await?;
        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => {
                tracing::debug!(collection, "Collection dropped");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection, error = %error, "Failed to drop collection");
                Err(error)
            }
        }
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response, || {
            tracing::debug!(collection, vector_size, "Collection created");
        })
        .await
    }

    async fn upsert_points(
        &self,
        collection: &str,
        chunks: Vec<IndexedChunk>,
    ) -> Result<(), QdrantError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let indexed_at = current_timestamp_rfc3339();
        let points: Vec<Value> = chunks
            .into_iter()
            .map(|chunk| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": chunk.vector,
                    "payload": {
                        "text": chunk.text,
                        "position": chunk.position,
                        "indexed_at": indexed_at,
                    },
                })
            })
            .collect();
        let count = points.len();

        let response = self
            .request(Method::PUT, &format!("collections/{collection}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        self.ensure_success(response, || {
            tracing::debug!(collection, points = count, "Points indexed");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn replace(
        &self,
        namespace: &str,
        dimension: usize,
        chunks: Vec<IndexedChunk>,
    ) -> Result<(), VectorStoreError> {
        let collection = self.collection_name(namespace);
        self.delete_collection(&collection).await?;
        self.create_collection(&collection, dimension).await?;
        self.upsert_points(&collection, chunks).await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let collection = self.collection_name(namespace);
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection}/points/query"),
            )
            .json(&body)
            .send()
            .await
            .map_err(QdrantError::from)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(VectorStoreError::MissingNamespace(namespace.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %collection, error = %error, "Qdrant search failed");
            return Err(error.into());
        }

        let payload: QueryResponse = response.json().await.map_err(QdrantError::from)?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| {
                let payload = point.payload.unwrap_or_default();
                ScoredChunk {
                    position: payload_position(&payload),
                    text: payload_text(&payload),
                    score: point.score,
                }
            })
            .collect())
    }

    async fn remove(&self, namespace: &str) -> Result<(), VectorStoreError> {
        self.delete_collection(&self.collection_name(namespace))
            .await?;
        Ok(())
    }
}

fn payload_text(payload: &Map<String, Value>) -> String {
    payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn payload_position(payload: &Map<String, Value>) -> usize {
    payload
        .get("position")
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or_default()
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
