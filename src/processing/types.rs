//! Core data types and error definitions for the question-answering pipeline.

use crate::{
    embedding::EmbeddingClientError, extraction::ExtractionError,
    generation::GenerationClientError, session::SessionError, vector::VectorStoreError,
};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A chunk size of zero cannot hold any text.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every chunk.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Requested overlap in characters.
        overlap: usize,
        /// Requested chunk size in characters.
        chunk_size: usize,
    },
}

/// Errors emitted by the question-answering pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Upload carried no usable filename.
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
    /// Session identifier failed validation.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Question text was empty.
    #[error("Question must not be empty")]
    EmptyQuestion,
    /// A question arrived before any document was uploaded in the session.
    #[error("No document uploaded yet; upload a document before asking questions")]
    NoDocument,
    /// The current document produced no indexable text.
    #[error("Uploaded document contains no text to index")]
    EmptyDocument,
    /// Persisting the upload failed.
    #[error("Failed to store upload at {}: {source}", path.display())]
    Storage {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Extracting text from the upload failed.
    #[error("Failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking parameters were rejected.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed while indexing or embedding the question.
    #[error("Retrieval unavailable: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected a write or query.
    #[error("Vector store request failed: {0}")]
    VectorStore(#[from] VectorStoreError),
    /// Answer generation failed.
    #[error("Answer generation failed: {0}")]
    Generation(#[from] GenerationClientError),
}

/// A chunk of document text and its position in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based order of the chunk within the document.
    pub position: usize,
    /// Chunk contents.
    pub text: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Stored filename (basename of the client-supplied name).
    pub filename: String,
    /// Extracted text, verbatim.
    pub text: String,
    /// SHA-256 fingerprint of the extracted text.
    pub fingerprint: String,
}

/// Result of a successful question.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Generator output, verbatim.
    pub answer: String,
    /// Whether the similarity index was built for this question.
    pub index_rebuilt: bool,
    /// Number of retrieved chunks placed in the prompt context.
    pub context_chunks: usize,
}
