//! Robots.txt handling module
//!
//! This module provides the robots capability consumed by link discovery:
//! fetching and parsing a domain's robots.txt, and answering whether a URL may
//! be fetched. Every failure along the way is treated as "allowed".

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::{fetch_raw, PageFetcher};
use std::time::Duration;
use url::Url;

/// Upper bound applied to a site's `Crawl-delay`
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// Answers whether a URL may be fetched
pub trait RobotsPolicy: Send + Sync {
    /// Returns true if the URL may be fetched
    fn can_fetch(&self, url: &Url) -> bool;

    /// Minimum pause between requests requested by the site, if any
    fn crawl_delay(&self) -> Option<Duration> {
        None
    }
}

/// Policy used when robots.txt is not consulted
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RobotsPolicy for AllowAll {
    fn can_fetch(&self, _url: &Url) -> bool {
        true
    }
}

/// Robots.txt rules bound to the user agent they are evaluated for
#[derive(Debug, Clone)]
pub struct RobotsRules {
    robots: ParsedRobots,
    user_agent: String,
}

impl RobotsRules {
    pub fn new(robots: ParsedRobots, user_agent: impl Into<String>) -> Self {
        Self {
            robots,
            user_agent: user_agent.into(),
        }
    }
}

impl RobotsPolicy for RobotsRules {
    fn can_fetch(&self, url: &Url) -> bool {
        self.robots.is_allowed(url.as_str(), &self.user_agent)
    }

    fn crawl_delay(&self) -> Option<Duration> {
        self.robots
            .crawl_delay(&self.user_agent)
            .filter(|delay| delay.is_finite() && *delay > 0.0)
            .and_then(|delay| Duration::try_from_secs_f64(delay).ok())
            .map(|delay| delay.min(MAX_CRAWL_DELAY))
    }
}

/// Fetches robots.txt for the origin of `url`
///
/// Fail-open: a missing file, an HTTP error, or a network failure all yield
/// rules that allow everything. Failures are logged, never returned.
///
/// # Arguments
///
/// * `fetcher` - The HTTP capability to fetch with
/// * `url` - Any URL on the domain
/// * `user_agent` - The agent token matched against robots.txt groups
pub async fn fetch_robots(fetcher: &dyn PageFetcher, url: &Url, user_agent: &str) -> RobotsRules {
    let robots = match url.join("/robots.txt") {
        Ok(robots_url) => match fetch_raw(fetcher, &robots_url).await {
            Ok(body) => {
                tracing::debug!("Fetched robots.txt from {}", robots_url);
                ParsedRobots::from_content(&String::from_utf8_lossy(&body))
            }
            Err(e) => {
                tracing::warn!("Failed to read robots.txt at {}: {}; allowing all", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Err(e) => {
            tracing::warn!("Cannot build robots.txt URL for {}: {}; allowing all", url, e);
            ParsedRobots::allow_all()
        }
    };

    RobotsRules::new(robots, user_agent)
}
