use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gemini caps `batchEmbedContents` at 100 requests per call.
const GEMINI_BATCH_LIMIT: usize = 100;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or did not match the request.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Embed a search query. Providers with asymmetric retrieval models override this.
    async fn embed_query(&self, text: String) -> Result<Vec<f32>, EmbeddingClientError> {
        self.generate_embeddings(vec![text])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingClientError::InvalidResponse("no vector returned".into()))
    }
}

/// Deterministic in-process embedding client.
///
/// Bytes are hashed into vector slots and the result is L2-normalized, so identical texts map to
/// identical vectors. Good enough for offline runs and tests, useless for semantics.
pub struct LocalEmbeddingClient {
    dimension: usize,
}

impl LocalEmbeddingClient {
    /// Construct a client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = (idx.wrapping_mul(31) ^ usize::from(byte)) % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for LocalEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            dimension = self.dimension,
            texts = texts.len(),
            "Generating local embeddings"
        );

        Ok(texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect())
    }
}

/// Retrieval role of the text being embedded.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Embedding client for the Gemini `batchEmbedContents` REST endpoint.
pub struct GeminiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiEmbeddingClient {
    /// Build a client for `model` (with or without the `models/` prefix).
    pub fn new(base_url: impl Into<String>, model: &str, api_key: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("rusty-docqa/embed")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into(),
            model: qualified_model(model),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model,
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: BatchEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Gemini embeddings: {error}"
            ))
        })?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(model = %self.model, texts = texts.len(), "Requesting Gemini embeddings");
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(GEMINI_BATCH_LIMIT) {
            vectors.extend(self.embed_batch(batch, TaskType::RetrievalDocument).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: String) -> Result<Vec<f32>, EmbeddingClientError> {
        self.embed_batch(std::slice::from_ref(&text), TaskType::RetrievalQuery)
            .await?
            .pop()
            .ok_or_else(|| EmbeddingClientError::InvalidResponse("no vector returned".into()))
    }
}

fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Build an embedding client suitable for the given configuration.
pub fn get_embedding_client(config: &Config) -> Box<dyn EmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::Gemini => Box::new(GeminiEmbeddingClient::new(
            config.gemini_base_url.clone(),
            &config.embedding_model,
            config.api_key.clone().unwrap_or_default(),
        )),
        EmbeddingProvider::Local => Box::new(LocalEmbeddingClient::new(config.embedding_dimension)),
    }
}
