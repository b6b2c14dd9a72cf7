//! docchat-retriever: PDF ingestion, chunk storage, and semantic retrieval
//!
//! This crate is the core of the docchat document question-answering
//! pipeline: it extracts per-page text from PDFs, chunks it (via
//! `docchat-chunk`), persists chunks and their embeddings in SQLite, and
//! answers queries by exact cosine-similarity retrieval plus optional answer
//! generation through an external completion service.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: chunk/embedding store, retriever, and pipeline engine
//! - **[`extract`]**: PDF text extraction and the page-rendering boundary
//! - **[`llm`]**: text-completion collaborator contract and client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use docchat_chunk::ChunkConfig;
//! use docchat_embed::{EmbedConfig, FastEmbedProvider};
//! use docchat_retriever::retrieval::chunk_index::ChunkIndex;
//! use docchat_retriever::retrieval::engine::DocChatEngine;
//! use docchat_retriever::retrieval::search::SearchConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let index = ChunkIndex::open(Path::new(".docchat.db")).await?;
//! let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::default()).await?);
//! let engine = DocChatEngine::new(
//!     index,
//!     ChunkConfig::default(),
//!     SearchConfig::default(),
//!     provider,
//! );
//!
//! let pdf = std::fs::read("manual.pdf")?;
//! engine.ingest_documents(&[("manual.pdf".to_string(), pdf)]).await?;
//! let answer = engine.ask("How often are the filters replaced?").await?;
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod llm;
pub mod retrieval;
