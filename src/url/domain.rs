use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_glean::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if both URLs point at the same host and port
///
/// Subdomains count as different sites, matching how the crawl scopes itself
/// to the exact host of the start URL.
pub fn is_same_domain(url: &Url, origin: &Url) -> bool {
    extract_domain(url).is_some()
        && extract_domain(url) == extract_domain(origin)
        && url.port_or_known_default() == origin.port_or_known_default()
}
