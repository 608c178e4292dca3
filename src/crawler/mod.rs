//! Crawler module for link discovery and session orchestration
//!
//! This module contains the discovery side of the pipeline, including:
//! - HTTP fetching behind the `PageFetcher` capability
//! - HTML parsing and link extraction
//! - Retry, backoff and politeness pacing
//! - The visited ledger and the concurrent discovery executor
//! - Overall crawl coordination

mod coordinator;
mod discovery;
mod fetcher;
mod ledger;
mod parser;
mod retry;

pub use coordinator::{run_crawl, runner_from_config, Coordinator, CrawlReport};
pub use discovery::{discover_links, DiscoveryError, DiscoveryExecutor, DiscoveryOutput};
pub use fetcher::{
    build_http_client, fetch_html, fetch_raw, is_html_content_type, FetchError, FetchResult,
    HttpFetcher, PageFetcher, RawResponse,
};
pub use ledger::Ledger;
pub use parser::{parse_html, ParsedPage};
pub use retry::{Politeness, RetryPolicy, Sleeper, TokioSleeper};

use crate::config::Config;
use crate::SumiError;

/// Runs a complete crawl session
///
/// This is the main entry point for harvesting a domain. It will:
/// 1. Validate the configuration
/// 2. Discover same-domain pages from the base URL
/// 3. Extract text from every page through the configured isolation mode
/// 4. Save accepted texts and write the optional summary
///
/// # Arguments
///
/// * `config` - The complete configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The session finished, possibly with no accepted text
/// * `Err(SumiError)` - The configuration was invalid
pub async fn crawl(config: Config) -> Result<CrawlReport, SumiError> {
    run_crawl(config).await
}
