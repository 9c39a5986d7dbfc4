//! Processing service coordinating extraction, indexing, retrieval, and answer generation.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    extraction::{DocumentFormat, ExtractionError, TextExtractor, UploadedDocument},
    generation::{GenerationClient, GenerationRequest, get_generation_client},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::chunk_text,
        prompt::{assemble_context, compose_prompt},
        types::{AnswerOutcome, ProcessingError, UploadOutcome},
    },
    session::{SessionDocument, SessionId, SessionLimits, SessionRegistry, SimilarityIndex},
    vector::{IndexedChunk, ScoredChunk, VectorStore, get_vector_store},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Tunables for the pipeline, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory uploads are written to.
    pub upload_dir: PathBuf,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Generation model identifier.
    pub generation_model: String,
    /// Generation temperature.
    pub temperature: f32,
    /// Session cap and idle timeout.
    pub session_limits: SessionLimits,
}

impl PipelineSettings {
    /// Copy the pipeline tunables out of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            top_k: config.retrieval_top_k,
            generation_model: config.generation_model.clone(),
            temperature: config.generation_temperature,
            session_limits: SessionLimits {
                max_sessions: config.max_sessions,
                idle_timeout: Duration::from_secs(config.session_idle_secs),
            },
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Coordinates the full pipeline: upload storage, text extraction, lazy indexing, and answers.
///
/// The service owns long-lived handles to every provider plus the session registry, so the HTTP
/// surface and the CLI share one implementation. Construct it once near process start and share
/// it through an `Arc`.
pub struct ProcessingService {
    extractor: TextExtractor,
    embedding_client: Box<dyn EmbeddingClient>,
    vector_store: Box<dyn VectorStore>,
    generation_client: Box<dyn GenerationClient>,
    sessions: SessionRegistry,
    metrics: Arc<PipelineMetrics>,
    settings: PipelineSettings,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Store an upload, extract its text, and make it the session's current document.
    async fn upload_document(
        &self,
        session: &SessionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome, ProcessingError>;

    /// Answer a question against the session's current document.
    async fn ask(
        &self,
        session: &SessionId,
        question: &str,
    ) -> Result<AnswerOutcome, ProcessingError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl ProcessingService {
    /// Build a service from configuration, wiring the configured providers.
    pub fn new(config: &Config) -> Result<Self, ProcessingError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedding_client = get_embedding_client(config);
        tracing::info!(backend = ?config.vector_backend, "Initializing vector store");
        let vector_store = get_vector_store(config)?;
        let generation_client = get_generation_client(config);
        tracing::info!(
            model = %config.generation_model,
            upload_dir = %config.upload_dir.display(),
            "Processing service ready"
        );
        Ok(Self::with_components(
            TextExtractor::from_config(config),
            embedding_client,
            vector_store,
            generation_client,
            PipelineSettings::from_config(config),
        ))
    }

    /// Build a service from explicit collaborators.
    pub fn with_components(
        extractor: TextExtractor,
        embedding_client: Box<dyn EmbeddingClient>,
        vector_store: Box<dyn VectorStore>,
        generation_client: Box<dyn GenerationClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            embedding_client,
            vector_store,
            generation_client,
            sessions: SessionRegistry::with_limits(settings.session_limits),
            metrics: Arc::new(PipelineMetrics::new()),
            settings,
        }
    }

    /// Store an upload, extract its text, and make it the session's current document.
    ///
    /// Unsupported formats are rejected before anything is written. Files land in a directory of
    /// their own per session, and the session stays locked from write to document swap, so two
    /// uploads never read each other's bytes. A failed extraction leaves the session's previous
    /// document in place.
    pub async fn upload_document(
        &self,
        session: &SessionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome, ProcessingError> {
        let filename = sanitize_filename(filename)?;
        if !DocumentFormat::from_filename(&filename).is_supported() {
            tracing::warn!(session = %session, filename = %filename, "Rejected unsupported upload");
            return Err(ExtractionError::UnsupportedFormat { filename }.into());
        }

        let handle = self.sessions.get_or_create(session).await;
        let (text, fingerprint, previous) = {
            let mut state = handle.lock().await;
            let location = self.store_upload(session, &filename, bytes).await?;
            let document = UploadedDocument::new(filename.clone(), location);
            let text = self.extractor.extract_document(&document).await?;

            let current = SessionDocument::new(filename.clone(), text.as_str());
            let fingerprint = current.fingerprint.clone();
            let previous = state.replace_document(current);
            (text, fingerprint, previous)
        };
        drop(handle);

        self.metrics.record_upload();
        tracing::info!(
            session = %session,
            filename = %filename,
            bytes = bytes.len(),
            characters = text.chars().count(),
            replaced = previous.is_some(),
            "Document uploaded"
        );
        self.evict_sessions().await;
        Ok(UploadOutcome {
            filename,
            text,
            fingerprint,
        })
    }

    /// Answer a question against the session's current document, indexing it first if needed.
    pub async fn ask(
        &self,
        session: &SessionId,
        question: &str,
    ) -> Result<AnswerOutcome, ProcessingError> {
        if question.trim().is_empty() {
            return Err(ProcessingError::EmptyQuestion);
        }
        let handle = self
            .sessions
            .get(session)
            .await
            .ok_or(ProcessingError::NoDocument)?;

        // Build and retrieval both run under the session lock: concurrent questions index once,
        // and an upload cannot rebuild the namespace while it is being queried.
        let (hits, index_rebuilt) = {
            let mut state = handle.lock().await;
            let document = state.document().cloned().ok_or(ProcessingError::NoDocument)?;
            let (index, index_rebuilt) = match state.fresh_index().cloned() {
                Some(index) => (index, false),
                None => {
                    let namespace = state.namespace().to_string();
                    let index = self.build_index(&namespace, &document).await?;
                    state.install_index(index.clone());
                    (index, true)
                }
            };
            (self.retrieve(question, &index).await?, index_rebuilt)
        };
        drop(handle);

        let mut outcome = self.generate_answer(question, &hits).await?;
        outcome.index_rebuilt = index_rebuilt;
        self.metrics.record_answer();
        tracing::info!(
            session = %session,
            index_rebuilt,
            context_chunks = outcome.context_chunks,
            "Question answered"
        );
        Ok(outcome)
    }

    /// Chunk, embed, and store `document` under `namespace`, replacing earlier vectors.
    pub async fn build_index(
        &self,
        namespace: &str,
        document: &SessionDocument,
    ) -> Result<SimilarityIndex, ProcessingError> {
        let chunks = chunk_text(
            &document.text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        if chunks.is_empty() {
            tracing::warn!(namespace, filename = %document.filename, "Document has no text to index");
            return Err(ProcessingError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedding_client.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} vectors, received {}",
                chunks.len(),
                vectors.len()
            ))
            .into());
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        let chunk_count = chunks.len();
        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk {
                position: chunk.position,
                text: chunk.text,
                vector,
            })
            .collect();
        self.vector_store
            .replace(namespace, dimension, indexed)
            .await?;

        self.metrics.record_index_build(chunk_count as u64);
        tracing::info!(
            namespace,
            filename = %document.filename,
            chunks = chunk_count,
            dimension,
            chunk_size = self.settings.chunk_size,
            overlap = self.settings.chunk_overlap,
            "Similarity index built"
        );
        Ok(SimilarityIndex {
            namespace: namespace.to_string(),
            fingerprint: document.fingerprint.clone(),
            chunk_count,
            dimension,
            built_at: OffsetDateTime::now_utc(),
        })
    }

    /// Retrieve the chunks closest to `question` and ask the generator to answer from them.
    pub async fn answer(
        &self,
        question: &str,
        index: &SimilarityIndex,
    ) -> Result<AnswerOutcome, ProcessingError> {
        let hits = self.retrieve(question, index).await?;
        self.generate_answer(question, &hits).await
    }

    /// Return the `top_k` chunks of `index` most similar to `question`.
    pub async fn retrieve(
        &self,
        question: &str,
        index: &SimilarityIndex,
    ) -> Result<Vec<ScoredChunk>, ProcessingError> {
        let vector = self
            .embedding_client
            .embed_query(question.to_string())
            .await?;
        let hits = self
            .vector_store
            .query(&index.namespace, &vector, self.settings.top_k)
            .await?;
        tracing::debug!(
            namespace = %index.namespace,
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Context retrieved"
        );
        Ok(hits)
    }

    async fn generate_answer(
        &self,
        question: &str,
        hits: &[ScoredChunk],
    ) -> Result<AnswerOutcome, ProcessingError> {
        let context = assemble_context(hits);
        let request = GenerationRequest {
            model: self.settings.generation_model.clone(),
            prompt: compose_prompt(&context, question),
            temperature: self.settings.temperature,
        };
        let answer = self.generation_client.generate(request).await?;
        Ok(AnswerOutcome {
            answer,
            index_rebuilt: false,
            context_chunks: hits.len(),
        })
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Evict idle and surplus sessions and drop their vectors. Returns how many were evicted.
    ///
    /// Failing to remove a namespace is logged and does not stop the sweep.
    pub async fn evict_sessions(&self) -> usize {
        let evicted = self.sessions.evict().await;
        for session in &evicted {
            if let Err(error) = self.vector_store.remove(&session.namespace).await {
                tracing::warn!(
                    session = %session.id,
                    namespace = %session.namespace,
                    error = %error,
                    "Failed to remove vectors of evicted session"
                );
            }
        }
        self.metrics.record_evictions(evicted.len() as u64);
        evicted.len()
    }

    /// Fingerprint of the session's current document, if any.
    pub async fn current_fingerprint(&self, session: &SessionId) -> Option<String> {
        let handle = self.sessions.get(session).await?;
        let state = handle.lock().await;
        state.document().map(|document| document.fingerprint.clone())
    }

    async fn store_upload(
        &self,
        session: &SessionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ProcessingError> {
        let dir = self.settings.upload_dir.join(session.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ProcessingError::Storage {
                path: dir.clone(),
                source,
            })?;
        let location = dir.join(filename);
        tokio::fs::write(&location, bytes)
            .await
            .map_err(|source| ProcessingError::Storage {
                path: location.clone(),
                source,
            })?;
        tracing::debug!(path = %location.display(), bytes = bytes.len(), "Upload stored");
        Ok(location)
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn upload_document(
        &self,
        session: &SessionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome, ProcessingError> {
        ProcessingService::upload_document(self, session, filename, bytes).await
    }

    async fn ask(
        &self,
        session: &SessionId,
        question: &str,
    ) -> Result<AnswerOutcome, ProcessingError> {
        ProcessingService::ask(self, session, question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}

/// Reduce a client-supplied filename to its final path component.
fn sanitize_filename(raw: &str) -> Result<String, ProcessingError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(ProcessingError::InvalidFilename(raw.to_string()));
    }
    Ok(base.to_string())
}
