//! Output module for extraction results
//!
//! This module handles:
//! - Aggregating extraction results into accepted texts and failures
//! - Writing accepted texts to sanitized file names
//! - Generating a markdown summary of the run

mod aggregate;
mod markdown;

pub use aggregate::{aggregate, persist, sanitize_filename, PLACEHOLDER_FILENAME};
pub use markdown::{format_markdown_summary, write_markdown_summary};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
