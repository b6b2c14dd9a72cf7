//! The long-lived pipeline object tying extraction, chunking, storage,
//! retrieval, and answer generation together.
//!
//! One [`DocChatEngine`] is constructed at startup with validated
//! configuration and held by the serving layer for its lifetime. Ingestion
//! and querying are synchronous request-per-call operations: each runs to
//! completion before returning.
//!
//! Failure isolation follows the error taxonomy of the pipeline: a document
//! that fails to extract is reported and skipped without aborting the batch,
//! a chunk that fails to encode is left unembedded, and a failed or
//! timed-out completion call degrades to an absent answer while retrieval
//! results are still returned.

use anyhow::Result;
use docchat_chunk::{ChunkConfig, Chunker, SourceRef};
use docchat_embed::EmbeddingProvider;
use std::sync::Arc;
use tracing::{info, warn};

use super::chunk_index::{ChunkIndex, StoreStats, StoredChunk};
use super::search::{Retriever, SearchConfig};
use crate::extract::{PdfTextExtractor, TextExtractor};
use crate::llm::{CompletionProvider, SYSTEM_INSTRUCTION};

/// Outcome of a batch ingestion: partial success is explicit.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Number of documents submitted.
    pub total: usize,
    /// Number of documents extracted and chunked successfully.
    pub processed: usize,
    /// Chunks written to the store across all processed documents.
    pub chunks_stored: usize,
    /// Embeddings created by the post-ingest embedding pass.
    pub embeddings_created: usize,
    /// Documents that failed, with the reason.
    pub failures: Vec<DocumentFailure>,
}

#[derive(Debug)]
pub struct DocumentFailure {
    pub document: String,
    pub reason: String,
}

impl IngestReport {
    /// One-line human summary, e.g. "2 of 3 documents processed".
    pub fn summary(&self) -> String {
        format!("{} of {} documents processed", self.processed, self.total)
    }
}

/// A retrieved passage with its provenance and similarity score.
#[derive(Debug, Clone)]
pub struct Passage {
    pub chunk: StoredChunk,
    pub similarity: f32,
}

/// Result of a query: retrieved passages plus an optional generated answer.
///
/// `response` is `None` when no completion provider is configured, when no
/// passage cleared the similarity threshold, or when the external call
/// failed; the passages are valid in every case.
#[derive(Debug)]
pub struct Answer {
    pub passages: Vec<Passage>,
    pub response: Option<String>,
}

/// The document question-answering pipeline.
pub struct DocChatEngine {
    index: ChunkIndex,
    chunker: Chunker,
    extractor: Box<dyn TextExtractor>,
    provider: Arc<dyn EmbeddingProvider>,
    completions: Option<Arc<dyn CompletionProvider>>,
    search_config: SearchConfig,
}

impl DocChatEngine {
    /// Assemble an engine from its parts. The chunk configuration has been
    /// validated by construction; nothing here can fail.
    pub fn new(
        index: ChunkIndex,
        chunk_config: ChunkConfig,
        search_config: SearchConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            index,
            chunker: Chunker::new(chunk_config),
            extractor: Box::new(PdfTextExtractor),
            provider,
            completions: None,
            search_config,
        }
    }

    /// Attach an answer-generation service.
    pub fn with_completions(mut self, completions: Arc<dyn CompletionProvider>) -> Self {
        self.completions = Some(completions);
        self
    }

    /// Replace the PDF extractor (e.g. with a stub in tests).
    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    /// Ingest a batch of `(document id, raw PDF bytes)` pairs.
    ///
    /// Each document is extracted, chunked, and stored; a document that
    /// fails to extract is recorded in the report and skipped. One embedding
    /// pass runs after all documents are stored.
    pub async fn ingest_documents(&self, documents: &[(String, Vec<u8>)]) -> Result<IngestReport> {
        let mut report = IngestReport {
            total: documents.len(),
            ..Default::default()
        };

        for (name, bytes) in documents {
            let pages = match self.extractor.extract(bytes) {
                Ok(pages) => pages,
                Err(error) => {
                    warn!(document = %name, %error, "skipping document that failed to extract");
                    report.failures.push(DocumentFailure {
                        document: name.clone(),
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            let pages: Vec<(SourceRef, String)> = pages
                .into_iter()
                .map(|page| (SourceRef::new(name.clone(), page.page), page.text))
                .collect();

            let chunks = self.chunker.chunk(&pages);
            let ids = self.index.store_chunks(&chunks).await?;
            info!(document = %name, chunks = ids.len(), "document ingested");

            report.processed += 1;
            report.chunks_stored += ids.len();
        }

        report.embeddings_created = self.index.create_embeddings(self.provider.as_ref()).await?;
        info!(
            summary = %report.summary(),
            chunks = report.chunks_stored,
            embeddings = report.embeddings_created,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Answer a query: retrieve the top-k passages, then generate a response
    /// from them if a completion provider is configured.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let retriever = Retriever::new(
            self.index.clone(),
            Arc::clone(&self.provider),
            self.search_config,
        );
        let hits = retriever.search_top_k(query, self.search_config.top_k).await?;

        let mut passages = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(chunk) = self.index.get_chunk(hit.chunk_id).await? {
                passages.push(Passage {
                    chunk,
                    similarity: hit.similarity,
                });
            }
        }

        if passages.is_empty() {
            return Ok(Answer {
                passages,
                response: None,
            });
        }

        let response = match &self.completions {
            Some(completions) => {
                let context = passages
                    .iter()
                    .map(|p| p.chunk.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                match completions.complete(SYSTEM_INSTRUCTION, &context, query).await {
                    Ok(text) => Some(text),
                    Err(error) => {
                        warn!(%error, "completion call failed, returning passages only");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Answer { passages, response })
    }

    /// Reset the store completely.
    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await
    }

    /// Store statistics for status display.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.index.stats().await
    }
}
