//! Extraction task and result messages
//!
//! Both types cross the process boundary as JSON, so they only hold owned,
//! serializable data.

use crate::config::ExtractionConfig;
use crate::extract::quality::RejectReason;
use crate::extract::render::RenderOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable input to one extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionTask {
    pub url: String,
    pub config: ExtractionConfig,
    pub proxy: Option<String>,
    /// User-Agent header for direct document downloads
    pub user_agent: String,
}

impl ExtractionTask {
    pub fn new(
        url: impl Into<String>,
        config: ExtractionConfig,
        proxy: Option<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            config,
            proxy,
            user_agent: user_agent.into(),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            headless: self.config.headless,
            proxy: self.proxy.clone(),
            browser_path: self.config.browser_path.clone(),
        }
    }

    /// Hard limit for the whole task, after which the dispatcher gives up on it
    ///
    /// Covers page load, settle delay, every scroll pause, consent passes and
    /// the configured headroom for browser start-up and shutdown.
    pub fn deadline(&self) -> Duration {
        let config = &self.config;
        config.page_load_timeout()
            + config.settle_delay()
            + config.scroll_pause() * config.max_scrolls
            + Duration::from_secs(2) * config.consent_passes
            + config.task_headroom()
    }
}

/// How an extraction ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionOutcome {
    Accepted,
    Rejected(RejectReason),
    Failed(String),
}

/// Output of one extraction; `text` is empty unless the outcome is `Accepted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    pub text: String,
    pub outcome: ExtractionOutcome,
}

impl ExtractionResult {
    pub fn accepted(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            outcome: ExtractionOutcome::Accepted,
        }
    }

    pub fn rejected(url: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            url: url.into(),
            text: String::new(),
            outcome: ExtractionOutcome::Rejected(reason),
        }
    }

    pub fn failed(url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: String::new(),
            outcome: ExtractionOutcome::Failed(cause.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Accepted) && !self.text.is_empty()
    }

    /// Human-readable outcome for logs and summaries
    pub fn describe(&self) -> String {
        match &self.outcome {
            ExtractionOutcome::Accepted => format!("accepted ({} chars)", self.text.chars().count()),
            ExtractionOutcome::Rejected(reason) => format!("rejected: {}", reason),
            ExtractionOutcome::Failed(cause) => format!("failed: {}", cause),
        }
    }
}
