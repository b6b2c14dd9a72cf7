//! PDF text extraction collaborator.
//!
//! The retrieval core treats extraction as a pure function from raw PDF bytes
//! to an ordered sequence of `(page index, plain text)` pairs with normalized
//! whitespace. A corrupt or unreadable PDF surfaces as a single error for the
//! whole document, never per page, so batch ingestion can skip it and move on.
//!
//! Page-image rendering for human-facing source verification is a separate
//! boundary: [`PageRenderer`] names the contract, the serving layer supplies
//! the implementation.

use anyhow::{Context, Result};
use lopdf::Document;

/// Plain text extracted from one page of a document.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Zero-based page index.
    pub page: usize,
    /// Page text with whitespace normalized to single ASCII spaces.
    pub text: String,
}

/// Extracts per-page plain text from raw PDF bytes.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>>;
}

/// Rasterizes a page to PNG bytes for provenance display.
///
/// Not used by the retrieval core; the UI layer implements and consumes this.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, document: &str, page: usize) -> Result<Vec<u8>>;
}

/// `lopdf`-backed extractor.
#[derive(Debug, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        let document = Document::load_mem(bytes).context("failed to parse PDF")?;

        let mut pages = Vec::new();
        // get_pages() is a BTreeMap keyed by 1-based page number, so
        // iteration follows document order.
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .with_context(|| format!("failed to extract text from page {page_no}"))?;

            pages.push(PageText {
                page: (page_no - 1) as usize,
                text: normalize_whitespace(&text),
            });
        }

        Ok(pages)
    }
}

/// Collapse all whitespace (newlines, non-breaking spaces, thin spaces, runs
/// of blanks) to single ASCII spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
