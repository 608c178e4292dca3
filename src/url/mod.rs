//! URL handling module for Sumi-Glean
//!
//! This module provides link normalization, domain scoping, and the file
//! extension rules that decide whether a URL is a page, a document, or
//! something the crawl never fetches.

mod domain;
mod normalize;

use url::Url;

// Re-export main functions
pub use domain::{extract_domain, is_same_domain};
pub use normalize::{normalize, normalize_url};

/// Extensions that are never fetched during link discovery
///
/// Documents, archives, and media are either handled by the extraction
/// worker directly or carry no readable text at all.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".7z", ".tar",
    ".gz", ".exe", ".dmg", ".mp3", ".mp4", ".avi", ".mov", ".wav", ".jpg", ".jpeg", ".png",
    ".gif", ".svg", ".webp",
];

/// Extensions whose text is read by parsing the file rather than rendering it
pub const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf"];

/// Returns true if the URL path ends in an extension link discovery skips
pub fn has_excluded_extension(url: &Url) -> bool {
    path_ends_with_any(url, EXCLUDED_EXTENSIONS)
}

/// Returns true if the URL points at a document the worker parses directly
pub fn is_document_url(url: &Url) -> bool {
    path_ends_with_any(url, DOCUMENT_EXTENSIONS)
}

fn path_ends_with_any(url: &Url, extensions: &[&str]) -> bool {
    let path = url.path().to_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}
