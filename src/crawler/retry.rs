//! Retry and pacing policies
//!
//! Waiting always goes through the [`Sleeper`] trait so tests can record the
//! requested delays instead of sleeping.

use crate::config::CrawlConfig;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Something that can wait for a duration
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Bounded retry with exponential backoff and random jitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to every backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay),
            max_jitter: Duration::from_millis(config.retry_max_jitter),
        }
    }

    /// A policy that tries exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry + jitter`
    pub fn backoff<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(retry));
        exponential.saturating_add(jitter(self.max_jitter, rng))
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// The sleeper is only consulted between attempts, never after the last.
    ///
    /// # Arguments
    ///
    /// * `sleeper` - Waits out each backoff
    /// * `op` - Produces one attempt per call
    /// * `is_retryable` - Decides whether an error deserves another attempt
    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let delay = self.backoff(attempt - 1, &mut rand::rng());
                    tracing::debug!(
                        "Attempt {}/{} failed, retrying in {:?}",
                        attempt,
                        max_attempts,
                        delay
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Randomized pause inserted after each successful discovery fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Politeness {
    min_delay: Duration,
    max_delay: Duration,
    /// Lower bound requested by the site (robots.txt `Crawl-delay`)
    floor: Option<Duration>,
}

impl Politeness {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay: min_delay.min(max_delay),
            max_delay: max_delay.max(min_delay),
            floor: None,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(
            Duration::from_millis(config.politeness_min_delay),
            Duration::from_millis(config.politeness_max_delay),
        )
    }

    /// No pause at all
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Raises every pause to at least `floor`
    pub fn with_floor(mut self, floor: Option<Duration>) -> Self {
        self.floor = floor;
        self
    }

    /// Draws the next pause: uniform in `[min, max]`, never below the floor
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let spread = self.max_delay - self.min_delay;
        let drawn = self.min_delay + jitter(spread, rng);
        match self.floor {
            Some(floor) => drawn.max(floor),
            None => drawn,
        }
    }
}

fn jitter<R: Rng + ?Sized>(max: Duration, rng: &mut R) -> Duration {
    let max_millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..=max_millis))
}
