//! Prompt assembly for retrieval-augmented answers.

use crate::vector::ScoredChunk;

/// Join retrieved chunk texts with newlines, most similar first.
pub fn assemble_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fill the fixed answer template with the retrieved context and the question.
pub fn compose_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context to answer the question. \
         Context: {context}, Question: {question} "
    )
}
