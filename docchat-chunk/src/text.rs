//! Sentence-aware chunking with overlap and provenance tracking.
//!
//! The chunker walks pages in their given order, splits each page's text into
//! sentences (a sentence ends at `.`, `!` or `?` followed by whitespace), and
//! packs whole sentences into chunks of at most [`ChunkConfig::max_length`]
//! characters. When a chunk closes, the trailing [`ChunkConfig::overlap`]
//! characters are carried into the next chunk so context survives the
//! boundary. Chunks never span a page boundary: a page's trailing partial
//! chunk is flushed before the next page starts.
//!
//! Every chunk records the ordered, deduplicated set of pages it was built
//! from, so a retrieval hit can always be traced back to its source.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default maximum chunk length in characters.
pub const DEFAULT_MAX_LENGTH: usize = 250;

/// Default number of trailing characters carried across a chunk boundary.
pub const DEFAULT_OVERLAP: usize = 25;

/// A sentence ends at `.`, `!` or `?` followed by at least one whitespace
/// character. Terminal punctuation without trailing whitespace (end of page)
/// is handled by the remainder logic in `split_sentences`.
const SENTENCE_BOUNDARY: &str = r"[.!?]\s+";

/// Identifies where a chunk of text came from: a document and a zero-based
/// page index within it. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Identifier of the ingested document, unique per document.
    pub document: String,
    /// Zero-based page index within the document.
    pub page: usize,
}

impl SourceRef {
    pub fn new(document: impl Into<String>, page: usize) -> Self {
        Self {
            document: document.into(),
            page,
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} p.{}", self.document, self.page + 1)
    }
}

/// Errors raised when a chunking configuration is invalid.
///
/// These are fatal: an invalid size/overlap combination is rejected at
/// construction time, never silently clamped.
#[derive(Debug, thiserror::Error)]
pub enum ChunkConfigError {
    #[error("max chunk length must be greater than zero")]
    ZeroMaxLength,

    #[error("overlap ({overlap}) must be smaller than max chunk length ({max_length})")]
    OverlapTooLarge { overlap: usize, max_length: usize },
}

/// Validated chunking parameters.
///
/// `overlap >= max_length` would make every chunk start with a full copy of
/// its predecessor, so it is rejected up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkConfig {
    max_length: usize,
    overlap: usize,
}

impl ChunkConfig {
    /// Create a configuration, rejecting degenerate combinations.
    pub fn new(max_length: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        if max_length == 0 {
            return Err(ChunkConfigError::ZeroMaxLength);
        }
        if overlap >= max_length {
            return Err(ChunkConfigError::OverlapTooLarge {
                overlap,
                max_length,
            });
        }
        Ok(Self {
            max_length,
            overlap,
        })
    }

    /// Maximum chunk length in characters.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Overlap carried across chunk boundaries, in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// A bounded span of document text assembled from whole sentences, the unit
/// of retrieval.
///
/// The text is a concatenation of complete sentences, except possibly a
/// leading overlap fragment inherited from the previous chunk. `references`
/// lists every page the chunk drew from, deduplicated, in first-seen order;
/// the first entry is the primary reference used for provenance display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub references: Vec<SourceRef>,
}

impl TextChunk {
    /// The reference used when a single source location must be shown.
    pub fn primary_reference(&self) -> Option<&SourceRef> {
        self.references.first()
    }
}

/// Splits per-page text into overlapping, sentence-respecting chunks.
pub struct Chunker {
    config: ChunkConfig,
    boundary: Regex,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            boundary: Regex::new(SENTENCE_BOUNDARY).unwrap(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunk pages in their given order.
    ///
    /// Pages must arrive in document order; iteration order is significant
    /// because chunk ids are later assigned in emission order. Empty page
    /// text produces no chunks.
    pub fn chunk(&self, pages: &[(SourceRef, String)]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_chars = 0usize;
        let mut references: Vec<SourceRef> = Vec::new();

        for (source, text) in pages {
            for sentence in self.split_sentences(text) {
                let sentence_chars = sentence.chars().count();

                if buffer_chars + sentence_chars > self.config.max_length && !buffer.is_empty() {
                    chunks.push(TextChunk {
                        text: buffer.clone(),
                        references: references.clone(),
                    });
                    // Seed the next chunk with the tail of the one just
                    // closed, and restart the reference list at the page
                    // that is about to resume.
                    buffer = tail_chars(&buffer, self.config.overlap);
                    buffer_chars = buffer.chars().count();
                    references = vec![source.clone()];
                }

                buffer.push_str(sentence);
                buffer.push(' ');
                buffer_chars += sentence_chars + 1;
                if !references.contains(source) {
                    references.push(source.clone());
                }
            }

            // Chunks never span a page boundary.
            if !buffer.is_empty() {
                chunks.push(TextChunk {
                    text: std::mem::take(&mut buffer),
                    references: std::mem::take(&mut references),
                });
                buffer_chars = 0;
            }
        }

        chunks
    }

    /// Split text at sentence boundaries, keeping the terminal punctuation
    /// with each sentence and discarding the separating whitespace.
    fn split_sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for boundary in self.boundary.find_iter(text) {
            // The punctuation mark is a single byte; the rest of the match
            // is the whitespace run that separated the sentences.
            let end = boundary.start() + 1;
            let sentence = &text[start..end];
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = boundary.end();
        }

        let remainder = &text[start..];
        if !remainder.trim().is_empty() {
            sentences.push(remainder);
        }

        sentences
    }
}

/// The last `count` characters of `text`, respecting char boundaries.
fn tail_chars(text: &str, count: usize) -> String {
    let total = text.chars().count();
    if total <= count {
        return text.to_string();
    }
    text.chars().skip(total - count).collect()
}
