//! Text extraction
//!
//! This module turns discovered URLs into readable text:
//! - Rendering pages in isolated browser contexts
//! - Parsing documents without a browser
//! - Filtering texts by length and language
//! - Dispatching tasks over a bounded pool of workers

mod consent;
mod dispatcher;
mod document;
mod language;
mod quality;
mod render;
mod task;
mod worker;

pub use consent::{click_script, presence_script, ConsentStrategy};
pub use dispatcher::{
    effective_workers, Dispatcher, InProcessRunner, SubprocessRunner, TaskRunner,
    SEQUENTIAL_BATCH_LIMIT,
};
pub use document::{DocumentTextExtractor, PdfTextExtractor, DOCUMENT_FETCH_TIMEOUT};
pub use language::{same_language, to_iso639_1, LanguageDetector, WhatlangDetector};
pub use quality::{accept, RejectReason, Verdict};
pub use render::{ChromeContext, ChromeRenderer, RenderContext, RenderError, RenderOptions, Renderer};
pub use task::{ExtractionOutcome, ExtractionResult, ExtractionTask};
pub use worker::{normalize_text, serve_stdio, ExtractionWorker};

use thiserror::Error;

/// Errors raised while running an extraction task
///
/// The worker folds these into a failed `ExtractionResult`; they only
/// surface directly from runners and the worker's stdio protocol.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("document parsing failed: {0}")]
    Document(String),

    #[error("fetch failed: {0}")]
    Fetch(#[from] crate::crawler::FetchError),

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("malformed worker message: {0}")]
    Message(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
