//! # docchat-chunk
//!
//! Sentence-respecting text chunking for the docchat retrieval pipeline.
//!
//! This crate turns per-page document text into overlapping chunks while
//! tracking which pages each chunk was assembled from. It is deliberately
//! free of I/O: callers feed it `(SourceRef, text)` pairs in page order and
//! get back [`TextChunk`]s ready to be persisted and embedded.
//!
//! ## Quick Start
//!
//! ```
//! use docchat_chunk::{ChunkConfig, Chunker, SourceRef};
//!
//! let chunker = Chunker::new(ChunkConfig::new(250, 25).unwrap());
//! let pages = vec![(
//!     SourceRef::new("manual.pdf", 0),
//!     "Open the valve. Check the gauge. Close the valve.".to_string(),
//! )];
//!
//! let chunks = chunker.chunk(&pages);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].references, vec![SourceRef::new("manual.pdf", 0)]);
//! ```

pub mod text;

pub use text::{ChunkConfig, ChunkConfigError, Chunker, SourceRef, TextChunk};
