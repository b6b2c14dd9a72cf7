//! SQLite-backed chunk and embedding storage.
//!
//! This module is the persistence layer of the pipeline: it owns the two
//! logical tables binding chunk text to source locations and embedding
//! vectors.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Chunk records: text plus provenance
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     content TEXT,                    -- chunk text
//!     document TEXT,                   -- primary source document id
//!     page INTEGER,                    -- primary source page (zero-based)
//!     refs_json TEXT,                  -- full ordered reference list
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Embedding records: one vector per chunk, created after the chunk
//! CREATE TABLE embeddings (
//!     chunk_id INTEGER PRIMARY KEY REFERENCES chunks(id),
//!     embedding BLOB                   -- f32 vector, little-endian bytes
//! );
//! ```
//!
//! Foreign keys are enabled on every connection, so an embedding row can
//! never reference a missing chunk. Chunks are append-only within a session;
//! the only delete is a full [`ChunkIndex::clear`].

use anyhow::{Context, Result};
use docchat_chunk::{SourceRef, TextChunk};
use docchat_embed::EmbeddingProvider;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::sanitize_for_encoding;

/// Database ID for a stored chunk.
pub type ChunkId = i64;

/// A chunk as persisted: text, assigned id, and its source references.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub text: String,
    /// Ordered, deduplicated references; the first is the primary one.
    pub references: Vec<SourceRef>,
}

impl StoredChunk {
    /// The reference used for provenance display.
    pub fn primary_reference(&self) -> Option<&SourceRef> {
        self.references.first()
    }
}

/// Counts of what the store currently holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub chunks: usize,
    pub embeddings: usize,
    pub documents: usize,
}

/// SQLite-based chunk and embedding repository.
///
/// The pool is the single shared resource of the pipeline; all reads and
/// writes go through it and writers are serialized by SQLite itself.
#[derive(Clone, Debug)]
pub struct ChunkIndex {
    pool: SqlitePool,
}

impl ChunkIndex {
    /// Opens the store with persistent SQLite storage, creating the schema
    /// if absent. Safe to call on every startup.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Opens an in-memory store for testing.
    ///
    /// Capped at one connection: every pooled connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .in_memory(true)
                    .foreign_keys(true),
            )
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                document TEXT NOT NULL,
                page INTEGER NOT NULL,
                refs_json TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Inserts chunks in order and returns their assigned ids.
    ///
    /// Ids are monotonically increasing; existing rows are never updated.
    pub async fn store_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<ChunkId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let primary = chunk
                .primary_reference()
                .context("chunk has no source reference")?;
            let refs_json = serde_json::to_string(&chunk.references)?;

            let result = sqlx::query(
                "INSERT INTO chunks (content, document, page, refs_json) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&chunk.text)
            .bind(&primary.document)
            .bind(primary.page as i64)
            .bind(refs_json)
            .execute(&mut *tx)
            .await?;

            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Encodes and persists an embedding for every chunk that lacks one.
    ///
    /// A chunk whose text fails to encode is logged and skipped, leaving it
    /// stored but unretrievable; the operation never aborts on a single
    /// failure. Returns the number of embeddings created.
    pub async fn create_embeddings(&self, provider: &dyn EmbeddingProvider) -> Result<usize> {
        let rows = sqlx::query(
            "SELECT c.id, c.content FROM chunks c
             LEFT JOIN embeddings e ON e.chunk_id = c.id
             WHERE e.chunk_id IS NULL ORDER BY c.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut created = 0;
        for row in rows {
            let id: i64 = row.get("id");
            let content: String = row.get("content");

            let embedding = match provider.embed_text(&sanitize_for_encoding(&content)).await {
                Ok(embedding) => embedding,
                Err(error) => {
                    tracing::warn!(chunk_id = id, %error, "skipping chunk that failed to encode");
                    continue;
                }
            };

            sqlx::query("INSERT INTO embeddings (chunk_id, embedding) VALUES (?1, ?2)")
                .bind(id)
                .bind(bytemuck::cast_slice::<f32, u8>(&embedding))
                .execute(&self.pool)
                .await?;
            created += 1;
        }

        tracing::debug!(created, "embedding pass complete");
        Ok(created)
    }

    /// Get a chunk by id.
    pub async fn get_chunk(&self, id: ChunkId) -> Result<Option<StoredChunk>> {
        let row = sqlx::query("SELECT id, content, refs_json FROM chunks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let refs_json: String = row.get("refs_json");
        let references: Vec<SourceRef> =
            serde_json::from_str(&refs_json).context("corrupt reference list")?;

        Ok(Some(StoredChunk {
            id: row.get("id"),
            text: row.get("content"),
            references,
        }))
    }

    /// All stored embeddings in ascending chunk id order.
    ///
    /// The ordering makes similarity ties deterministic downstream.
    pub async fn get_all_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>> {
        let rows = sqlx::query("SELECT chunk_id, embedding FROM embeddings ORDER BY chunk_id")
            .fetch_all(&self.pool)
            .await?;

        let mut embeddings = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk_id: i64 = row.get("chunk_id");
            let bytes: Vec<u8> = row.get("embedding");
            // pod_collect_to_vec copies, so blob alignment doesn't matter
            embeddings.push((chunk_id, bytemuck::pod_collect_to_vec::<u8, f32>(&bytes)));
        }
        Ok(embeddings)
    }

    /// Atomically deletes all chunk and embedding records, leaving the
    /// schema intact.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM embeddings").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::info!("chunk store cleared");
        Ok(())
    }

    /// Counts of chunks, embeddings, and distinct documents.
    pub async fn stats(&self) -> Result<StoreStats> {
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT document) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            chunks: chunks as usize,
            embeddings: embeddings as usize,
            documents: documents as usize,
        })
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_embed::{EmbedError, EmbeddingResult, HashedNgramProvider};

    fn chunk(text: &str, document: &str, page: usize) -> TextChunk {
        TextChunk {
            text: text.to_string(),
            references: vec![SourceRef::new(document, page)],
        }
    }

    /// Provider that refuses to encode any text containing a marker.
    struct FlakyProvider {
        inner: HashedNgramProvider,
        poison: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed_text(&self, text: &str) -> docchat_embed::Result<Vec<f32>> {
            if text.contains(self.poison) {
                return Err(EmbedError::invalid_config("poisoned text"));
            }
            self.inner.embed_text(text).await
        }

        async fn embed_texts(&self, texts: &[String]) -> docchat_embed::Result<EmbeddingResult> {
            let mut embeddings = Vec::new();
            for text in texts {
                embeddings.push(self.embed_text(text).await?);
            }
            Ok(EmbeddingResult::new(embeddings))
        }

        fn embedding_dimension(&self) -> usize {
            self.inner.embedding_dimension()
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn store_assigns_monotonic_ids() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;

        let ids = index
            .store_chunks(&[
                chunk("first chunk.", "a.pdf", 0),
                chunk("second chunk.", "a.pdf", 0),
                chunk("third chunk.", "a.pdf", 1),
            ])
            .await?;

        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let more = index.store_chunks(&[chunk("fourth chunk.", "b.pdf", 0)]).await?;
        assert!(more[0] > ids[2]);
        Ok(())
    }

    #[tokio::test]
    async fn get_chunk_round_trips_references() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;

        let stored = TextChunk {
            text: "spans two pages.".to_string(),
            references: vec![SourceRef::new("doc.pdf", 1), SourceRef::new("doc.pdf", 2)],
        };
        let ids = index.store_chunks(std::slice::from_ref(&stored)).await?;

        let fetched = index.get_chunk(ids[0]).await?.unwrap();
        assert_eq!(fetched.text, "spans two pages.");
        assert_eq!(fetched.references, stored.references);
        assert_eq!(fetched.primary_reference(), Some(&SourceRef::new("doc.pdf", 1)));

        assert!(index.get_chunk(9999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn create_embeddings_skips_failures_without_aborting() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;
        index
            .store_chunks(&[
                chunk("one fine chunk.", "a.pdf", 0),
                chunk("two fine chunk.", "a.pdf", 0),
                chunk("POISON in this chunk.", "a.pdf", 1),
                chunk("four fine chunk.", "a.pdf", 1),
                chunk("five fine chunk.", "a.pdf", 2),
            ])
            .await?;

        let provider = FlakyProvider {
            inner: HashedNgramProvider::default(),
            poison: "POISON",
        };

        let created = index.create_embeddings(&provider).await?;
        assert_eq!(created, 4);
        assert_eq!(index.get_all_embeddings().await?.len(), 4);
        assert_eq!(index.stats().await?.embeddings, 4);
        Ok(())
    }

    #[tokio::test]
    async fn create_embeddings_is_incremental() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;
        let provider = HashedNgramProvider::default();

        index.store_chunks(&[chunk("first batch.", "a.pdf", 0)]).await?;
        assert_eq!(index.create_embeddings(&provider).await?, 1);

        index.store_chunks(&[chunk("second batch.", "a.pdf", 1)]).await?;
        // Only the new chunk gets encoded
        assert_eq!(index.create_embeddings(&provider).await?, 1);
        assert_eq!(index.get_all_embeddings().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn embeddings_require_an_existing_chunk() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;

        let orphan = sqlx::query("INSERT INTO embeddings (chunk_id, embedding) VALUES (42, ?1)")
            .bind(bytemuck::cast_slice::<f32, u8>(&[1.0, 0.0]))
            .execute(index.pool())
            .await;
        assert!(orphan.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn clear_empties_both_tables_and_keeps_schema() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;
        index.store_chunks(&[chunk("some chunk.", "a.pdf", 0)]).await?;
        index.create_embeddings(&HashedNgramProvider::default()).await?;

        index.clear().await?;

        let stats = index.stats().await?;
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.embeddings, 0);
        assert_eq!(stats.documents, 0);

        // Schema is intact: inserts still work
        let ids = index.store_chunks(&[chunk("new chunk.", "b.pdf", 0)]).await?;
        assert_eq!(ids.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_blobs_round_trip_as_f32() -> Result<()> {
        let index = ChunkIndex::open_memory().await?;
        let ids = index.store_chunks(&[chunk("vector chunk.", "a.pdf", 0)]).await?;

        let vector = vec![0.25f32, -1.5, 3.0];
        sqlx::query("INSERT INTO embeddings (chunk_id, embedding) VALUES (?1, ?2)")
            .bind(ids[0])
            .bind(bytemuck::cast_slice::<f32, u8>(&vector))
            .execute(index.pool())
            .await?;

        let all = index.get_all_embeddings().await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, ids[0]);
        assert_eq!(all[0].1, vector);
        Ok(())
    }
}
