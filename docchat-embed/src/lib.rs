//! # docchat-embed
//!
//! Text embedding providers for the docchat retrieval pipeline.
//!
//! The crate exposes one trait, [`EmbeddingProvider`], and two
//! implementations:
//!
//! - [`FastEmbedProvider`]: real sentence embeddings through local ONNX
//!   models via `fastembed`, with a process-wide model cache. The default
//!   model is `all-MiniLM-L6-v2` (384 dimensions).
//! - [`HashedNgramProvider`]: a deterministic character-trigram embedder
//!   with no model download, used offline and in tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docchat_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//! let vector = provider.embed_text("How often are valves inspected?").await?;
//! assert_eq!(vector.len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! All operations return [`Result<T>`] with the crate's [`EmbedError`] type.
//! Embedding inference is CPU-bound and runs on blocking threads; the async
//! surface exists so callers inside a tokio runtime never stall the executor.

pub mod config;
pub mod error;
pub mod provider;

pub use config::{DEFAULT_MODEL_NAME, EmbedConfig};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, HashedNgramProvider};
