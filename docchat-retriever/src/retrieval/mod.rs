//! Core retrieval pipeline: persistent chunk/embedding storage, semantic
//! search, and the ingestion engine that ties them together.
//!
//! ## Key Components
//!
//! - **[`chunk_index::ChunkIndex`]**: SQLite-backed store binding chunks to
//!   their source references and embedding vectors
//! - **[`search::Retriever`]**: exact cosine-similarity search over stored
//!   embeddings
//! - **[`engine::DocChatEngine`]**: the long-lived pipeline object the
//!   serving layer holds
//!
//! ## Pipeline Flow
//!
//! ```text
//! PDF bytes → TextExtractor → Chunker → ChunkIndex → Retriever → answers
//!                                ↑           ↑            ↑
//!                          docchat-chunk  SQLite    docchat-embed
//! ```

pub mod chunk_index;
pub mod engine;
pub mod search;

/// Strip characters outside the printable ASCII range before encoding.
///
/// Applied to chunk text and queries alike so stored embeddings and query
/// embeddings are produced over the same character domain.
pub fn sanitize_for_encoding(text: &str) -> String {
    text.chars().filter(|c| (' '..='~').contains(c)).collect()
}
