use crate::extract::ConsentStrategy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Glean
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Link discovery configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Start URL; only pages on its host are discovered
    pub base_url: String,

    /// Maximum number of distinct URLs a session may schedule
    pub max_pages: usize,

    /// Maximum number of concurrent discovery fetches
    pub max_threads: usize,

    /// Skip URLs disallowed by the domain's robots.txt
    pub respect_robots: bool,

    /// Per-request timeout (seconds)
    pub fetch_timeout: u64,

    /// Fetch attempts per URL before it is recorded as an error
    pub retry_attempts: u32,

    /// Backoff before the first retry, doubled on each further retry (milliseconds)
    pub retry_base_delay: u64,

    /// Upper bound of the random jitter added to each backoff (milliseconds)
    pub retry_max_jitter: u64,

    /// Lower bound of the pause after each successful fetch (milliseconds)
    pub politeness_min_delay: u64,

    /// Upper bound of the pause after each successful fetch (milliseconds)
    pub politeness_max_delay: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            max_pages: 20,
            max_threads: 10,
            respect_robots: false,
            fetch_timeout: 10,
            retry_attempts: 2,
            retry_base_delay: 1000,
            retry_max_jitter: 1000,
            politeness_min_delay: 500,
            politeness_max_delay: 1500,
        }
    }
}

/// What the quality gate does when the language of a text cannot be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionFailurePolicy {
    /// Log a warning and keep the text
    #[default]
    Accept,
    /// Drop the text
    Reject,
}

/// How extraction tasks are isolated from each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// Each task runs in its own `sumi-glean worker` process
    #[default]
    Process,
    /// Each task runs in its own tokio task inside the current process
    InProcess,
}

/// Page extraction configuration
///
/// A copy of this travels with every extraction task, so it must stay
/// serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Maximum number of concurrent extraction workers (defaults to the CPU count)
    pub max_workers: Option<usize>,

    /// Run the browser without a window
    pub headless: bool,

    /// Page load timeout (seconds)
    pub page_load_timeout: u64,

    /// Pause after navigation before consent dismissal (milliseconds)
    pub settle_delay: u64,

    /// Pause between scrolls (milliseconds)
    pub scroll_pause: u64,

    /// Maximum number of scrolls per page
    pub max_scrolls: u32,

    /// Minimum number of characters for a text to be kept
    pub min_content_length: usize,

    /// Expected language code (ISO 639-1, e.g. "en")
    pub language: String,

    /// Outcome when language detection fails
    pub language_detection_failure: DetectionFailurePolicy,

    /// Capture a screenshot when rendering fails
    pub screenshot_on_fail: bool,

    /// Directory for failure screenshots
    pub screenshot_dir: PathBuf,

    /// Maximum number of pages read from a document
    pub max_document_pages: usize,

    /// How many times the consent strategies are tried per page
    pub consent_passes: u32,

    /// Consent-banner dismissal strategies, tried in order
    pub consent: Vec<ConsentStrategy>,

    /// Explicit browser executable; autodetected when absent
    pub browser_path: Option<PathBuf>,

    /// Task isolation mode
    pub isolation: Isolation,

    /// Re-run the first URL once when every extraction came back empty
    pub retry_first_on_total_failure: bool,

    /// Time allowed per task on top of loading and scrolling, for browser
    /// start-up and shutdown (milliseconds)
    pub task_headroom: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            headless: true,
            page_load_timeout: 20,
            settle_delay: 2000,
            scroll_pause: 1500,
            max_scrolls: 15,
            min_content_length: 400,
            language: "en".to_string(),
            language_detection_failure: DetectionFailurePolicy::default(),
            screenshot_on_fail: true,
            screenshot_dir: PathBuf::from("screenshots"),
            max_document_pages: 10,
            consent_passes: 2,
            consent: ConsentStrategy::defaults(),
            browser_path: None,
            isolation: Isolation::default(),
            retry_first_on_total_failure: false,
            task_headroom: 60_000,
        }
    }
}

impl ExtractionConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause)
    }

    pub fn task_headroom(&self) -> Duration {
        Duration::from_millis(self.task_headroom)
    }
}

/// How a proxy is chosen from the configured list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxySelection {
    /// Always use the first proxy
    #[default]
    First,
    /// Draw a proxy at random for every extraction task
    Random,
}

/// Proxy configuration for the rendering browser
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Proxy servers, e.g. "http://10.0.0.1:3128"
    pub servers: Vec<String>,

    /// Selection policy over `servers`
    pub selection: ProxySelection,
}

impl ProxyConfig {
    /// Picks a proxy according to the selection policy
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if self.servers.is_empty() {
            return None;
        }

        let index = match self.selection {
            ProxySelection::First => 0,
            ProxySelection::Random => rng.random_range(0..self.servers.len()),
        };
        self.servers.get(index).cloned()
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory for extracted text files
    pub directory: PathBuf,

    /// Write one text file per accepted URL
    pub save_text: bool,

    /// Log extraction progress while the batch runs
    pub show_progress: bool,

    /// Optional markdown summary of the run
    pub summary_path: Option<PathBuf>,

    /// Maximum length of a generated file name (without extension)
    pub max_filename_length: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output/text"),
            save_text: true,
            show_progress: false,
            summary_path: None,
            max_filename_length: 100,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also used for robots.txt matching
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    pub contact_email: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiGlean".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            contact_email: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = self
            .contact_url
            .iter()
            .map(|url| format!("+{}", url))
            .chain(self.contact_email.iter().cloned())
            .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}
