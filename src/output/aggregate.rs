//! Result aggregation and text persistence

use crate::extract::ExtractionResult;
use crate::output::OutputResult;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// File stem used when a URL sanitizes to nothing
pub const PLACEHOLDER_FILENAME: &str = "output";

/// Splits extraction results into accepted texts and everything else
///
/// A URL is successful only if it was accepted with non-empty text; rejected
/// and failed URLs both land in the failed set.
pub fn aggregate(results: &[ExtractionResult]) -> (BTreeMap<String, String>, BTreeSet<String>) {
    let mut successful = BTreeMap::new();
    let mut failed = BTreeSet::new();

    for result in results {
        if result.is_accepted() {
            successful.insert(result.url.clone(), result.text.clone());
        } else {
            failed.insert(result.url.clone());
        }
    }

    (successful, failed)
}

/// Writes each text to `dir/<sanitized url>.txt`
///
/// The directory is created if needed; failing to create it is the only
/// fatal error. Individual files that cannot be written are logged and
/// skipped. Two URLs that sanitize to the same name get `-2`, `-3`, ...
/// suffixes in map order.
///
/// # Returns
///
/// The paths that were written.
pub fn persist(
    texts: &BTreeMap<String, String>,
    dir: &Path,
    max_filename_length: usize,
) -> OutputResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(texts.len());

    for (url, text) in texts {
        let stem = unique_stem(&sanitize_filename(url, max_filename_length), max_filename_length, &mut used);
        let path = dir.join(format!("{}.txt", stem));

        match std::fs::write(&path, text.as_bytes()) {
            Ok(()) => {
                tracing::debug!("Saved {} to {}", url, path.display());
                written.push(path);
            }
            Err(e) => tracing::warn!("Could not write {}: {}", path.display(), e),
        }
    }

    tracing::info!("Saved {} text files to {}", written.len(), dir.display());
    Ok(written)
}

/// Turns a URL into a file stem made of `[a-z0-9_-]`
///
/// The scheme prefix is dropped, every other character outside the allowed
/// set becomes `_`, underscore runs collapse to one, and the result is
/// trimmed of underscores and cut to `max_length` characters.
///
/// # Examples
///
/// ```
/// use sumi_glean::output::sanitize_filename;
///
/// assert_eq!(sanitize_filename("https://Example.com/Path?q=1", 100), "example_com_path_q_1");
/// assert_eq!(sanitize_filename("https://", 100), "output");
/// ```
pub fn sanitize_filename(url: &str, max_length: usize) -> String {
    let lowered = url.trim().to_lowercase();
    let stripped = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);

    let mut sanitized = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }

    let truncated: String = sanitized
        .trim_matches('_')
        .chars()
        .take(max_length)
        .collect();
    let truncated = truncated.trim_end_matches('_');

    if truncated.is_empty() {
        PLACEHOLDER_FILENAME.chars().take(max_length.max(1)).collect()
    } else {
        truncated.to_string()
    }
}

fn unique_stem(stem: &str, max_length: usize, used: &mut HashSet<String>) -> String {
    if used.insert(stem.to_string()) {
        return stem.to_string();
    }

    let mut n = 2;
    loop {
        let suffix = format!("-{}", n);
        let keep = max_length.saturating_sub(suffix.len()).max(1);
        let candidate = format!("{}{}", stem.chars().take(keep).collect::<String>(), suffix);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
