//! Link discovery executor
//!
//! Breadth-first exploration of a single domain. Each round fetches the whole
//! frontier concurrently (at most `max_threads` requests in flight), offers
//! every same-domain link to the [`Ledger`], and hands the accepted links to
//! the next round. Discovery ends when a round produces no new links or the
//! visited set reaches the page budget; fetches already in flight are
//! allowed to finish.

use crate::config::CrawlConfig;
use crate::crawler::fetcher::{fetch_html, FetchError, FetchResult, PageFetcher};
use crate::crawler::ledger::Ledger;
use crate::crawler::parser::parse_html;
use crate::crawler::retry::{Politeness, RetryPolicy, Sleeper, TokioSleeper};
use crate::robots::{fetch_robots, AllowAll, RobotsPolicy};
use crate::url::{has_excluded_extension, is_same_domain, normalize_url};
use crate::UrlResult;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// A URL that could not be fetched, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryError {
    pub url: Url,
    pub cause: String,
}

/// Result of a discovery session
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutput {
    /// Normalized, same-domain HTML pages that were fetched successfully
    pub links: Vec<Url>,
    /// URLs that exhausted their retries or failed permanently
    pub errors: Vec<DiscoveryError>,
}

/// What happened to one frontier URL
enum PageVisit {
    /// Fetched as HTML; carries the links it added to the frontier
    Expanded(Vec<Url>),
    /// Fetched but not HTML
    Skipped,
    /// Fetch failed
    Failed(DiscoveryError),
}

/// Bounded-concurrency link discovery over one domain
#[derive(Clone)]
pub struct DiscoveryExecutor {
    fetcher: Arc<dyn PageFetcher>,
    robots: Arc<dyn RobotsPolicy>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    politeness: Politeness,
    max_pages: usize,
    max_threads: usize,
}

impl DiscoveryExecutor {
    /// Creates an executor that ignores robots.txt and sleeps on the tokio timer
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &CrawlConfig) -> Self {
        Self {
            fetcher,
            robots: Arc::new(AllowAll),
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::from_config(config),
            politeness: Politeness::from_config(config),
            max_pages: config.max_pages.max(1),
            max_threads: config.max_threads.max(1),
        }
    }

    /// Consults `robots` before every fetch and honours its crawl delay
    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.politeness = self.politeness.with_floor(robots.crawl_delay());
        self.robots = robots;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_politeness(mut self, politeness: Politeness) -> Self {
        self.politeness = politeness;
        self
    }

    /// Explores the domain of `start`
    ///
    /// # Arguments
    ///
    /// * `start` - The start URL; it is normalized before use
    ///
    /// # Returns
    ///
    /// Visited pages in lexicographic order plus the fetch errors collected
    /// along the way. An empty `links` list means nothing was reachable.
    pub async fn discover(&self, start: &Url) -> DiscoveryOutput {
        let origin = match normalize_url(start.as_str()) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Cannot normalize start URL {}: {}", start, e);
                return DiscoveryOutput::default();
            }
        };

        let ledger = Arc::new(Ledger::new(self.max_pages));
        let semaphore = Arc::new(Semaphore::new(self.max_threads));
        let origin = Arc::new(origin);
        let mut errors = Vec::new();

        let mut frontier = Vec::new();
        if self.admit(&origin) && ledger.try_enqueue(&origin) {
            frontier.push(origin.as_ref().clone());
        } else {
            tracing::warn!("Start URL {} is excluded from discovery", origin);
        }

        let mut round = 0;
        while !frontier.is_empty() && !ledger.is_full() {
            round += 1;
            tracing::debug!(
                "Discovery round {}: {} URLs, {}/{} visited",
                round,
                frontier.len(),
                ledger.size(),
                self.max_pages
            );

            let mut tasks = JoinSet::new();
            for url in frontier.drain(..) {
                let executor = self.clone();
                let ledger = Arc::clone(&ledger);
                let semaphore = Arc::clone(&semaphore);
                let origin = Arc::clone(&origin);

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        ledger.mark_dropped(&url);
                        return PageVisit::Skipped;
                    };

                    let visit = AssertUnwindSafe(executor.visit(&ledger, &origin, url.clone()))
                        .catch_unwind()
                        .await;

                    visit.unwrap_or_else(|_| {
                        ledger.mark_dropped(&url);
                        PageVisit::Failed(DiscoveryError {
                            url,
                            cause: "discovery task panicked".to_string(),
                        })
                    })
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(PageVisit::Expanded(next)) => frontier.extend(next),
                    Ok(PageVisit::Skipped) => {}
                    Ok(PageVisit::Failed(error)) => errors.push(error),
                    Err(e) => tracing::error!("Discovery task aborted: {}", e),
                }
            }
        }

        let links = ledger.visited_urls();
        tracing::info!(
            "Discovery finished after {} rounds: {} pages, {} errors",
            round,
            links.len(),
            errors.len()
        );

        DiscoveryOutput { links, errors }
    }

    /// Returns true if a URL may be fetched at all
    fn admit(&self, url: &Url) -> bool {
        if has_excluded_extension(url) {
            tracing::trace!("Skipping non-HTML extension: {}", url);
            return false;
        }
        if !self.robots.can_fetch(url) {
            tracing::debug!("Disallowed by robots.txt: {}", url);
            return false;
        }
        true
    }

    /// Fetches one frontier URL and offers its links to the ledger
    async fn visit(&self, ledger: &Ledger, origin: &Url, url: Url) -> PageVisit {
        let fetched = self
            .retry
            .run(
                self.sleeper.as_ref(),
                || fetch_html(self.fetcher.as_ref(), &url),
                FetchError::is_transient,
            )
            .await;

        match fetched {
            Ok(FetchResult::Success { final_url, body, .. }) => {
                ledger.mark_visited(&url);
                tracing::debug!("Visited {} ({}/{})", url, ledger.size(), self.max_pages);

                let page = parse_html(&body, &final_url);
                let next: Vec<Url> = page
                    .links
                    .into_iter()
                    .filter(|link| is_same_domain(link, origin))
                    .filter(|link| self.admit(link))
                    .filter(|link| ledger.try_enqueue(link))
                    .collect();

                let pause = self.politeness.delay(&mut rand::rng());
                self.sleeper.sleep(pause).await;

                PageVisit::Expanded(next)
            }
            Ok(FetchResult::ContentMismatch { content_type }) => {
                tracing::debug!("Not HTML ({}): {}", content_type, url);
                ledger.mark_dropped(&url);
                PageVisit::Skipped
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", url, e);
                ledger.mark_dropped(&url);
                PageVisit::Failed(DiscoveryError {
                    url,
                    cause: e.to_string(),
                })
            }
        }
    }
}

/// Runs discovery for `config.base_url`
///
/// Fetches the domain's robots.txt first when `respect_robots` is set;
/// robots failures allow everything.
///
/// # Arguments
///
/// * `fetcher` - The HTTP capability
/// * `config` - Discovery settings
/// * `robots_agent` - The agent token matched against robots.txt groups
pub async fn discover_links(
    fetcher: Arc<dyn PageFetcher>,
    config: &CrawlConfig,
    robots_agent: &str,
) -> UrlResult<DiscoveryOutput> {
    let start = normalize_url(&config.base_url)?;
    let mut executor = DiscoveryExecutor::new(Arc::clone(&fetcher), config);

    if config.respect_robots {
        let rules = fetch_robots(fetcher.as_ref(), &start, robots_agent).await;
        executor = executor.with_robots(Arc::new(rules));
    }

    Ok(executor.discover(&start).await)
}
