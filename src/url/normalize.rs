use crate::{UrlError, UrlResult};
use url::Url;

/// Normalizes a link found on a page into its canonical comparable form
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace and resolve the link against `base`
/// 2. Reject anything that is not HTTP(S) or has no host
/// 3. Lowercase scheme and host (path and query case is preserved)
/// 4. Remove fragment (everything after #)
/// 5. Remove trailing slashes from the path, keeping the root `/`
/// 6. Sort query parameters by key then value and re-encode them
/// 7. Remove empty query string (trailing ?)
///
/// Normalization is idempotent: feeding a normalized URL back in yields the
/// same URL regardless of `base`.
///
/// # Arguments
///
/// * `raw_href` - The link as written in the document (absolute or relative)
/// * `base` - The URL the link is resolved against
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - The link cannot be turned into a crawlable URL
///
/// # Examples
///
/// ```
/// use sumi_glean::url::normalize;
/// use url::Url;
///
/// let base = Url::parse("https://Example.com/docs/").unwrap();
/// let url = normalize("guide/?b=2&a=1#intro", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs/guide?a=1&b=2");
/// ```
pub fn normalize(raw_href: &str, base: &Url) -> UrlResult<Url> {
    let href = raw_href.trim();

    let mut url = base
        .join(href)
        .map_err(|e| UrlError::InvalidUrl(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // The url crate already lowercases scheme and host for special schemes
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    let path = normalize_path(url.path());
    url.set_path(&path);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes an absolute URL string
///
/// Convenience wrapper around [`normalize`] for URLs that do not need a base,
/// such as the start URL of a crawl.
///
/// # Examples
///
/// ```
/// use sumi_glean::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/page/").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let base = Url::parse(url_str.trim()).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(url_str, &base)
}

/// Strips trailing slashes; an empty result becomes the root path
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Collects query parameters sorted by key, then by value
fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    params.sort();
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/section/page").unwrap()
    }

    #[test]
    fn test_resolve_relative_link() {
        let result = normalize("other", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/section/other");
    }

    #[test]
    fn test_resolve_root_relative_link() {
        let result = normalize("/a", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize("https://example.com/page/", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remove_repeated_trailing_slashes() {
        let result = normalize("https://example.com/page//", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize("https://example.com/", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize("/page#section", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let a = normalize("/a?y=1&x=2", &base_url()).unwrap();
        let b = normalize("/a?x=2&y=1", &base_url()).unwrap();
        assert_eq!(a.as_str(), "https://example.com/a?x=2&y=1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sort_repeated_keys_by_value() {
        let result = normalize("/a?k=2&k=1", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/a?k=1&k=2");
    }

    #[test]
    fn test_remove_empty_query() {
        let result = normalize("/a?", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_lowercase_host_only() {
        let result = normalize("HTTPS://EXAMPLE.COM/Page?Q=Value", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page?Q=Value");
    }

    #[test]
    fn test_keeps_http_scheme() {
        let result = normalize("http://example.com/page", &base_url()).unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_trims_whitespace() {
        let result = normalize("  /a/b/  ", &base_url()).unwrap();
        assert_eq!(result.as_str(), "https://example.com/a/b");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize("mailto:someone@example.com", &base_url());
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        let result = normalize_url("not a url");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidUrl(_)));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "/a/b/?z=%20x&a=b+c#frag",
            "https://EXAMPLE.com//",
            "../up/?k",
            "/path%2Fencoded/?q=%C3%A9",
            "?only=query",
            "/a?x=2&y=1&x=1",
        ];

        for input in inputs {
            let once = normalize(input, &base_url()).unwrap();
            let twice = normalize(once.as_str(), &base_url()).unwrap();
            assert_eq!(once, twice, "normalization of {} is not idempotent", input);

            let other_base = Url::parse("https://unrelated.org/x/y").unwrap();
            let thrice = normalize(once.as_str(), &other_base).unwrap();
            assert_eq!(once, thrice);
        }
    }
}
