#![deny(missing_docs)]

//! Core library for the Rusty DocQA server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction from PDFs, images, and CSV files.
pub mod extraction;
/// Answer generation through a hosted language model.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Question-answering pipeline: chunking, indexing, retrieval, and prompts.
pub mod processing;
/// Per-session document and index state.
pub mod session;
/// Vector store abstraction with in-memory and Qdrant backends.
pub mod vector;
