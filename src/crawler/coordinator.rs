//! Crawl coordinator - end-to-end session orchestration
//!
//! A session runs the whole pipeline once:
//! - Discovering same-domain pages from the base URL
//! - Falling back to the base URL itself when nothing was found
//! - Dispatching one extraction task per page
//! - Aggregating, saving and summarizing the results
//!
//! Every session owns its configuration and capabilities; nothing is shared
//! between sessions.

use crate::config::{validate, Config, Isolation};
use crate::crawler::discovery::{discover_links, DiscoveryError, DiscoveryOutput};
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::extract::{
    Dispatcher, ExtractionOutcome, ExtractionResult, ExtractionTask, ExtractionWorker,
    InProcessRunner, SubprocessRunner, TaskRunner,
};
use crate::output::{aggregate, persist, write_markdown_summary};
use crate::url::normalize_url;
use crate::SumiError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything a finished session produced
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Normalized base URL
    pub base_url: String,
    /// Pages found by discovery, before any fallback
    pub links: Vec<Url>,
    pub discovery_errors: Vec<DiscoveryError>,
    /// One result per extracted URL
    pub results: Vec<ExtractionResult>,
    /// Accepted texts by URL
    pub texts: BTreeMap<String, String>,
    /// URLs whose extraction was rejected or failed
    pub failed: BTreeSet<String>,
    pub saved_files: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_hash: Option<String>,
}

impl CrawlReport {
    pub fn new(base_url: impl Into<String>, results: Vec<ExtractionResult>) -> Self {
        let (texts, failed) = aggregate(&results);
        let now = Utc::now();
        Self {
            base_url: base_url.into(),
            links: Vec::new(),
            discovery_errors: Vec::new(),
            results,
            texts,
            failed,
            saved_files: Vec::new(),
            started_at: now,
            finished_at: now,
            config_hash: None,
        }
    }

    /// URL → text for every extracted URL; empty text means not accepted
    pub fn text_by_url(&self) -> BTreeMap<String, String> {
        self.results
            .iter()
            .map(|result| {
                let text = if result.is_accepted() {
                    result.text.clone()
                } else {
                    String::new()
                };
                (result.url.clone(), text)
            })
            .collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_accepted()).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ExtractionOutcome::Rejected(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ExtractionOutcome::Failed(_)))
            .count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Main crawl session structure
pub struct Coordinator {
    config: Config,
    runner: Arc<dyn TaskRunner>,
    fetcher: Arc<dyn PageFetcher>,
    user_agent: String,
    config_hash: Option<String>,
}

impl Coordinator {
    /// Creates a session after validating the configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The complete configuration
    /// * `runner` - Executes extraction tasks
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(SumiError)` - Invalid configuration or HTTP client setup failure
    pub fn new(config: Config, runner: Arc<dyn TaskRunner>) -> Result<Self, SumiError> {
        validate(&config)?;

        let user_agent = config.user_agent.header_value();
        let fetcher = HttpFetcher::new(
            &user_agent,
            Duration::from_secs(config.crawl.fetch_timeout),
        )?;

        Ok(Self {
            config,
            runner,
            fetcher: Arc::new(fetcher),
            user_agent,
            config_hash: None,
        })
    }

    /// Replaces the discovery fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Records the config file hash in the report and summary
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the session to completion
    pub async fn run(&self) -> Result<CrawlReport, SumiError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the session until it completes or `cancel` resolves
    ///
    /// Cancellation during discovery ends the session with no results;
    /// cancellation during extraction keeps the results that finished and
    /// records every other URL as failed.
    pub async fn run_until<C>(&self, cancel: C) -> Result<CrawlReport, SumiError>
    where
        C: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let base = normalize_url(&self.config.crawl.base_url)?;
        tokio::pin!(cancel);

        tracing::info!(
            "Starting crawl of {} (max {} pages, {} threads)",
            base,
            self.config.crawl.max_pages,
            self.config.crawl.max_threads
        );

        let discovery = tokio::select! {
            output = discover_links(
                Arc::clone(&self.fetcher),
                &self.config.crawl,
                &self.config.user_agent.crawler_name,
            ) => output?,
            _ = &mut cancel => {
                tracing::warn!("Crawl cancelled during discovery");
                return Ok(self.finish(&base, DiscoveryOutput::default(), Vec::new(), started_at));
            }
        };

        let mut targets = discovery.links.clone();
        if targets.is_empty() {
            tracing::warn!("Discovery found no pages, falling back to {}", base);
            targets.push(base.clone());
        }

        let tasks = self.build_tasks(&targets);
        let first = tasks.first().cloned();

        let dispatcher = Dispatcher::new(Arc::clone(&self.runner))
            .with_max_workers(self.config.extraction.max_workers)
            .with_progress(self.config.output.show_progress);

        let interrupted = AtomicBool::new(false);
        let mut results = dispatcher
            .dispatch_until(tasks, async {
                cancel.as_mut().await;
                interrupted.store(true, Ordering::SeqCst);
            })
            .await;

        let nothing_accepted = !results.iter().any(ExtractionResult::is_accepted);
        if self.config.extraction.retry_first_on_total_failure
            && nothing_accepted
            && !interrupted.load(Ordering::SeqCst)
        {
            if let Some(task) = first {
                tracing::warn!("No text was accepted, retrying {} once", task.url);
                tokio::select! {
                    retried = dispatcher.run_single(task) => {
                        if let Some(slot) = results.iter_mut().find(|r| r.url == retried.url) {
                            *slot = retried;
                        }
                    }
                    _ = cancel.as_mut() => tracing::warn!("Retry cancelled"),
                }
            }
        }

        Ok(self.finish(&base, discovery, results, started_at))
    }

    /// One task per target, each with its own proxy draw
    fn build_tasks(&self, targets: &[Url]) -> Vec<ExtractionTask> {
        let mut rng = rand::rng();
        targets
            .iter()
            .map(|url| {
                ExtractionTask::new(
                    url.as_str(),
                    self.config.extraction.clone(),
                    self.config.proxy.pick(&mut rng),
                    self.user_agent.as_str(),
                )
            })
            .collect()
    }

    /// Aggregates results, saves texts and writes the summary
    fn finish(
        &self,
        base: &Url,
        discovery: DiscoveryOutput,
        results: Vec<ExtractionResult>,
        started_at: DateTime<Utc>,
    ) -> CrawlReport {
        let mut report = CrawlReport::new(base.as_str(), results);
        report.links = discovery.links;
        report.discovery_errors = discovery.errors;
        report.started_at = started_at;
        report.config_hash = self.config_hash.clone();

        let output = &self.config.output;
        if output.save_text && !report.texts.is_empty() {
            match persist(&report.texts, &output.directory, output.max_filename_length) {
                Ok(files) => report.saved_files = files,
                Err(e) => tracing::warn!(
                    "Could not save texts to {}: {}",
                    output.directory.display(),
                    e
                ),
            }
        }

        report.finished_at = Utc::now();

        if let Some(path) = &output.summary_path {
            match write_markdown_summary(&report, path) {
                Ok(()) => tracing::info!("Wrote run summary to {}", path.display()),
                Err(e) => tracing::warn!("Could not write summary {}: {}", path.display(), e),
            }
        }

        tracing::info!(
            "Crawl completed: {} pages discovered, {} accepted, {} rejected, {} failed in {:.1}s",
            report.links.len(),
            report.accepted_count(),
            report.rejected_count(),
            report.failed_count(),
            report.duration().num_milliseconds() as f64 / 1000.0
        );

        report
    }
}

/// Builds the task runner selected by `extraction.isolation`
///
/// Process isolation re-executes the running binary, which must understand
/// the `worker` subcommand (the `sumi-glean` binary does).
pub fn runner_from_config(config: &Config) -> Result<Arc<dyn TaskRunner>, SumiError> {
    Ok(match config.extraction.isolation {
        Isolation::Process => Arc::new(SubprocessRunner::current_exe()?),
        Isolation::InProcess => Arc::new(InProcessRunner::new(ExtractionWorker::chrome())),
    })
}

/// Runs a complete session with the runner chosen by the configuration
pub async fn run_crawl(config: Config) -> Result<CrawlReport, SumiError> {
    let runner = runner_from_config(&config)?;
    Coordinator::new(config, runner)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::RawResponse;
    use crate::crawler::FetchError;
    use crate::extract::{ExtractError, RejectReason};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeSite {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FakeSite {
        async fn get(&self, url: &Url) -> Result<RawResponse, FetchError> {
            let (status, body) = match self.pages.get(url.as_str()) {
                Some(body) => (200, body.clone()),
                None => (404, String::new()),
            };
            Ok(RawResponse {
                final_url: url.clone(),
                status,
                content_type: "text/html".to_string(),
                body: body.into_bytes(),
            })
        }
    }

    /// Accepts URLs listed in `accept`, rejects the rest; logs every task
    #[derive(Default)]
    struct FakeRunner {
        accept: Vec<String>,
        accept_on_retry: bool,
        seen: Mutex<Vec<ExtractionTask>>,
    }

    #[async_trait]
    impl TaskRunner for FakeRunner {
        async fn run(&self, task: ExtractionTask) -> Result<ExtractionResult, ExtractError> {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            let repeat = seen.iter().any(|t| t.url == task.url);
            seen.push(task.clone());

            if self.accept.contains(&task.url) || (repeat && self.accept_on_retry) {
                Ok(ExtractionResult::accepted(&task.url, format!("text of {}", task.url)))
            } else {
                Ok(ExtractionResult::rejected(&task.url, RejectReason::TooShort))
            }
        }
    }

    fn site(pages: &[(&str, &str)]) -> Arc<FakeSite> {
        Arc::new(FakeSite {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
        })
    }

    fn config(out: &TempDir) -> Config {
        let mut config = Config::default();
        config.crawl.base_url = "https://example.com/".to_string();
        config.crawl.politeness_min_delay = 0;
        config.crawl.politeness_max_delay = 0;
        config.crawl.retry_base_delay = 0;
        config.crawl.retry_max_jitter = 0;
        config.output.directory = out.path().join("text");
        config
    }

    #[tokio::test]
    async fn test_session_saves_accepted_texts() {
        let out = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner {
            accept: vec!["https://example.com/a".to_string()],
            ..Default::default()
        });
        let fetcher = site(&[
            ("https://example.com/", r#"<a href="/a">A</a><a href="/b">B</a>"#),
            ("https://example.com/a", "<p>a</p>"),
            ("https://example.com/b", "<p>b</p>"),
        ]);

        let report = Coordinator::new(config(&out), runner.clone())
            .unwrap()
            .with_fetcher(fetcher)
            .run()
            .await
            .unwrap();

        assert_eq!(report.links.len(), 3);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.texts.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.text_by_url()["https://example.com/b"], "");
        assert_eq!(report.saved_files.len(), 1);
        assert!(out.path().join("text/example_com_a.txt").exists());
    }

    #[tokio::test]
    async fn test_empty_discovery_falls_back_to_base_url() {
        let out = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());

        let report = Coordinator::new(config(&out), runner.clone())
            .unwrap()
            .with_fetcher(site(&[]))
            .run()
            .await
            .unwrap();

        assert!(report.links.is_empty());
        assert_eq!(report.discovery_errors.len(), 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].url, "https://example.com/");
        assert!(report.saved_files.is_empty());
        assert!(!out.path().join("text").exists());
    }

    #[tokio::test]
    async fn test_total_failure_retries_first_url() {
        let out = TempDir::new().unwrap();
        let mut config = config(&out);
        config.extraction.retry_first_on_total_failure = true;

        let runner = Arc::new(FakeRunner {
            accept_on_retry: true,
            ..Default::default()
        });

        let report = Coordinator::new(config, runner.clone())
            .unwrap()
            .with_fetcher(site(&[("https://example.com/", "<p>home</p>")]))
            .run()
            .await
            .unwrap();

        assert_eq!(runner.seen.lock().unwrap().len(), 2);
        assert_eq!(report.accepted_count(), 1);
        assert_eq!(report.results.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_discovery() {
        let out = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());

        let report = Coordinator::new(config(&out), runner.clone())
            .unwrap()
            .with_fetcher(site(&[("https://example.com/", "<p>home</p>")]))
            .run_until(std::future::ready(()))
            .await
            .unwrap();

        assert!(report.results.len() <= 1);
        assert!(report.texts.is_empty());
    }

    #[tokio::test]
    async fn test_tasks_carry_proxy_and_user_agent() {
        let out = TempDir::new().unwrap();
        let mut config = config(&out);
        config.proxy.servers = vec!["http://10.0.0.1:3128".to_string()];
        config.user_agent.crawler_name = "TestBot".to_string();
        config.user_agent.crawler_version = "2.0".to_string();

        let runner = Arc::new(FakeRunner::default());
        Coordinator::new(config, runner.clone())
            .unwrap()
            .with_fetcher(site(&[("https://example.com/", "<p>home</p>")]))
            .run()
            .await
            .unwrap();

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen[0].proxy.as_deref(), Some("http://10.0.0.1:3128"));
        assert_eq!(seen[0].user_agent, "TestBot/2.0");
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let runner: Arc<dyn TaskRunner> = Arc::new(FakeRunner::default());
        let result = Coordinator::new(Config::default(), runner);
        assert!(matches!(result, Err(SumiError::Config(_))));
    }

    #[tokio::test]
    async fn test_summary_written_when_configured() {
        let out = TempDir::new().unwrap();
        let mut config = config(&out);
        config.output.summary_path = Some(out.path().join("summary.md"));

        let runner = Arc::new(FakeRunner::default());
        Coordinator::new(config, runner)
            .unwrap()
            .with_fetcher(site(&[("https://example.com/", "<p>home</p>")]))
            .with_config_hash("deadbeef")
            .run()
            .await
            .unwrap();

        let summary = std::fs::read_to_string(out.path().join("summary.md")).unwrap();
        assert!(summary.contains("deadbeef"));
    }
}
