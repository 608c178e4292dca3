//! Document text capability
//!
//! Documents are fetched as bytes and parsed directly; no browser is involved.

use crate::extract::ExtractError;
use pdf_extract::{Document, PlainTextOutput};
use std::time::Duration;

/// Timeout for downloading a document
pub const DOCUMENT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Turns document bytes into plain text
pub trait DocumentTextExtractor: Send + Sync {
    /// Extracts the text of the first `max_pages` pages
    fn extract_text(&self, bytes: &[u8], max_pages: usize) -> Result<String, ExtractError>;
}

/// `DocumentTextExtractor` for PDF files, backed by pdf-extract
///
/// The object tree is loaded whole, but page content streams are only
/// interpreted for the pages that are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl DocumentTextExtractor for PdfTextExtractor {
    fn extract_text(&self, bytes: &[u8], max_pages: usize) -> Result<String, ExtractError> {
        let mut doc = Document::load_mem(bytes).map_err(|e| ExtractError::Document(e.to_string()))?;
        if doc.is_encrypted() {
            doc.decrypt("")
                .map_err(|e| ExtractError::Document(format!("encrypted document: {}", e)))?;
        }

        tracing::debug!(
            "PDF has {} pages, reading at most {}",
            doc.get_pages().len(),
            max_pages
        );

        let pages = first_pages(max_pages, |page_num| {
            let mut text = String::new();
            let mut output = PlainTextOutput::new(&mut text);
            pdf_extract::output_doc_page(&doc, &mut output, page_num).ok()?;
            drop(output);
            Some(text)
        });

        Ok(pages.join("\n"))
    }
}

/// Reads pages 1, 2, ... until `max_pages` are collected or a page is missing
fn first_pages<F>(max_pages: usize, mut read_page: F) -> Vec<String>
where
    F: FnMut(u32) -> Option<String>,
{
    let mut pages = Vec::new();
    for page_num in (1..=u32::MAX).take(max_pages) {
        match read_page(page_num) {
            Some(text) => pages.push(text),
            None => break,
        }
    }
    pages
}
