//! Question-answering pipeline: chunking, lazy indexing, retrieval, and prompt assembly.

pub mod chunking;
pub mod prompt;
mod service;
pub mod types;

pub use chunking::{TextSplitter, chunk_text};
pub use service::{PipelineSettings, ProcessingApi, ProcessingService};
pub use types::{AnswerOutcome, ChunkingError, ProcessingError, TextChunk, UploadOutcome};
