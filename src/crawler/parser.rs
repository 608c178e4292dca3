//! HTML parser for extracting links and metadata
//!
//! This module handles parsing fetched HTML to extract:
//! - Anchor targets to offer to the ledger
//! - The canonical link, which becomes the base for resolving every other link
//! - The page title

use crate::url::normalize;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// The declared canonical URL, if any
    pub canonical: Option<Url>,

    /// Normalized link targets, in document order, deduplicated
    pub links: Vec<Url>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Anything that fails normalization
///
/// Relative links are resolved against the canonical URL when the page
/// declares one, otherwise against `page_url`.
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the page was actually served from
///
/// # Example
///
/// ```
/// use sumi_glean::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page/">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &page_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let canonical_target = extract_canonical(&document, page_url);
    let link_base = canonical_target.as_ref().unwrap_or(page_url);
    let mut links = extract_links(&document, link_base);
    let canonical = canonical_target.and_then(|target| normalize(target.as_str(), page_url).ok());

    if let Some(canonical) = &canonical {
        if !links.contains(canonical) {
            links.push(canonical.clone());
        }
    }

    ParsedPage {
        title,
        canonical,
        links,
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves the first usable canonical link without normalizing it
///
/// The raw target is kept so relative links resolve exactly as a browser
/// would resolve them (a trailing slash changes the base directory).
fn extract_canonical(document: &Html, page_url: &Url) -> Option<Url> {
    let selector = Selector::parse("link[rel='canonical'][href]").ok()?;

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| page_url.join(href.trim()).ok())
        .find(|url| url.scheme() == "http" || url.scheme() == "https")
}

/// Extracts all valid anchor targets from the HTML document
fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let mut links: Vec<Url> = Vec::new();
    let mut seen: HashSet<Url> = HashSet::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        // Skip if it has the download attribute
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(href) = element.value().attr("href") {
            if let Some(url) = resolve_link(href, base) {
                if seen.insert(url.clone()) {
                    links.push(url);
                }
            }
        }
    }

    links
}

/// Resolves and normalizes a link href
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    match normalize(href, base) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::trace!("Dropping link {:?}: {}", href, e);
            None
        }
    }
}
