//! Qdrant vector store integration.

pub mod client;
pub mod types;

pub use client::QdrantVectorStore;
pub use types::QdrantError;
