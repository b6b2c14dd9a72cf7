//! Exact nearest-neighbor search over stored embeddings.
//!
//! The retriever encodes the query with the same provider and the same
//! printable-ASCII sanitization used at ingestion time, loads every stored
//! `(chunk id, embedding)` pair, and ranks them by cosine similarity. Results
//! below the configured similarity threshold are dropped rather than returned
//! as weak matches. Iteration is in ascending chunk id order and the sort is
//! stable, so equal similarities resolve to the first-stored chunk.
//!
//! Complexity is O(n·d) per query. No index structure: exact results at the
//! small corpus sizes this store is built for.

use anyhow::Result;
use docchat_embed::EmbeddingProvider;
use std::sync::Arc;

use super::chunk_index::{ChunkId, ChunkIndex};
use super::sanitize_for_encoding;

/// Similarity gating and result count configuration.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Minimum cosine similarity a result must reach; anything below is
    /// treated as "no match".
    pub threshold: f32,
    /// Number of top results returned by default.
    pub top_k: usize,
}

impl SearchConfig {
    pub fn new(threshold: f32, top_k: usize) -> Self {
        Self {
            threshold,
            top_k: top_k.max(1),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.25,
            top_k: 1,
        }
    }
}

/// A retrieval hit: chunk id plus its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: ChunkId,
    pub similarity: f32,
}

/// Cosine-similarity retriever over a [`ChunkIndex`].
pub struct Retriever {
    index: ChunkIndex,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl Retriever {
    pub fn new(index: ChunkIndex, provider: Arc<dyn EmbeddingProvider>, config: SearchConfig) -> Self {
        Self {
            index,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The single best match above the threshold, or `None`.
    pub async fn search(&self, query: &str) -> Result<Option<ScoredChunk>> {
        Ok(self.search_top_k(query, 1).await?.into_iter().next())
    }

    /// The `k` best matches above the threshold, highest similarity first.
    ///
    /// An empty store or a query with no sufficiently similar chunk yields
    /// an empty result, never an error.
    pub async fn search_top_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self
            .provider
            .embed_text(&sanitize_for_encoding(query))
            .await?;

        let stored = self.index.get_all_embeddings().await?;
        if stored.is_empty() {
            tracing::debug!("search against empty embedding set");
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .map(|(chunk_id, embedding)| ScoredChunk {
                chunk_id: *chunk_id,
                similarity: cosine_similarity(&query_embedding, embedding),
            })
            .filter(|hit| hit.similarity >= self.config.threshold)
            .collect();

        // Stable sort over ascending-id input: ties keep the first id
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k.max(1));

        Ok(scored)
    }
}

/// Cosine similarity between two f32 vectors: dot product over the product
/// of Euclidean norms. Mismatched lengths or a zero vector score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_chunk::{SourceRef, TextChunk};
    use docchat_embed::{EmbeddingResult, HashedNgramProvider};

    /// Provider returning canned vectors keyed by the query text.
    struct CannedProvider {
        vectors: Vec<(&'static str, Vec<f32>)>,
    }

    #[async_trait]
    impl EmbeddingProvider for CannedProvider {
        async fn embed_text(&self, text: &str) -> docchat_embed::Result<Vec<f32>> {
            Ok(self
                .vectors
                .iter()
                .find(|(key, _)| *key == text)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| vec![0.0, 0.0]))
        }

        async fn embed_texts(&self, texts: &[String]) -> docchat_embed::Result<EmbeddingResult> {
            let mut embeddings = Vec::new();
            for text in texts {
                embeddings.push(self.embed_text(text).await?);
            }
            Ok(EmbeddingResult::new(embeddings))
        }

        fn embedding_dimension(&self) -> usize {
            2
        }

        fn provider_name(&self) -> &str {
            "canned"
        }
    }

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            text: text.to_string(),
            references: vec![SourceRef::new("doc.pdf", 0)],
        }
    }

    async fn index_with_vectors(vectors: &[Vec<f32>]) -> Result<(ChunkIndex, Vec<ChunkId>)> {
        let index = ChunkIndex::open_memory().await?;
        let chunks: Vec<TextChunk> = (0..vectors.len())
            .map(|i| chunk(&format!("chunk number {i}.")))
            .collect();
        let ids = index.store_chunks(&chunks).await?;

        for (id, vector) in ids.iter().zip(vectors) {
            sqlx::query("INSERT INTO embeddings (chunk_id, embedding) VALUES (?1, ?2)")
                .bind(id)
                .bind(bytemuck::cast_slice::<f32, u8>(vector))
                .execute(index.pool())
                .await?;
        }
        Ok((index, ids))
    }

    #[test]
    fn cosine_of_vector_with_itself_is_one() {
        let v = vec![0.3, -1.2, 4.5, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[tokio::test]
    async fn empty_store_returns_no_match() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;
        let retriever = Retriever::new(
            index,
            Arc::new(HashedNgramProvider::default()),
            SearchConfig::default(),
        );

        assert!(retriever.search("anything at all").await?.is_none());
        assert!(retriever.search_top_k("anything", 5).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn most_similar_chunk_wins() -> Result<()> {
        let (index, ids) =
            index_with_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]]).await?;

        let provider = CannedProvider {
            vectors: vec![("query", vec![1.0, 0.0])],
        };
        let retriever = Retriever::new(index, Arc::new(provider), SearchConfig::new(0.0, 3));

        let best = retriever.search("query").await?.unwrap();
        assert_eq!(best.chunk_id, ids[0]);
        assert!((best.similarity - 1.0).abs() < 1e-5);

        let ranked = retriever.search_top_k("query", 3).await?;
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].chunk_id, ids[0]); // similarity 1.0
        assert_eq!(ranked[1].chunk_id, ids[2]); // ~0.707
        assert_eq!(ranked[2].chunk_id, ids[1]); // 0.0
        Ok(())
    }

    #[tokio::test]
    async fn ties_resolve_to_first_stored_chunk() -> Result<()> {
        let (index, ids) =
            index_with_vectors(&[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]]).await?;

        let provider = CannedProvider {
            vectors: vec![("query", vec![1.0, 0.0])],
        };
        let retriever = Retriever::new(index, Arc::new(provider), SearchConfig::default());

        let best = retriever.search("query").await?.unwrap();
        assert_eq!(best.chunk_id, ids[0]);
        Ok(())
    }

    #[tokio::test]
    async fn search_is_idempotent() -> Result<()> {
        let (index, _ids) =
            index_with_vectors(&[vec![0.9, 0.1], vec![0.1, 0.9], vec![0.5, 0.5]]).await?;

        let provider = CannedProvider {
            vectors: vec![("which chunk?", vec![0.8, 0.2])],
        };
        let retriever = Retriever::new(index, Arc::new(provider), SearchConfig::new(0.1, 2));

        let first = retriever.search("which chunk?").await?.unwrap();
        let second = retriever.search("which chunk?").await?.unwrap();
        assert_eq!(first.chunk_id, second.chunk_id);
        Ok(())
    }

    #[tokio::test]
    async fn results_below_threshold_are_no_match() -> Result<()> {
        let (index, ids) = index_with_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]]).await?;

        let provider = CannedProvider {
            vectors: vec![("query", vec![0.9, 0.05])],
        };
        let retriever = Retriever::new(index, Arc::new(provider), SearchConfig::new(0.95, 5));

        let hits = retriever.search_top_k("query", 5).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, ids[0]);

        // Raise the bar above everything: explicit no-match
        let strict = Retriever::new(
            retriever.index.clone(),
            Arc::new(CannedProvider {
                vectors: vec![("query", vec![0.9, 0.05])],
            }),
            SearchConfig::new(0.9999, 5),
        );
        assert!(strict.search("query").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn clear_then_search_returns_no_match() -> Result<()> {
        let (index, _ids) = index_with_vectors(&[vec![1.0, 0.0]]).await?;
        index.clear().await?;

        let retriever = Retriever::new(
            index,
            Arc::new(CannedProvider {
                vectors: vec![("query", vec![1.0, 0.0])],
            }),
            SearchConfig::default(),
        );
        assert!(retriever.search("query").await?.is_none());
        Ok(())
    }
}
