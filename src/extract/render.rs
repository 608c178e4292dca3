//! Rendering capability and its Chrome implementation
//!
//! A [`Renderer`] opens one isolated [`RenderContext`] per extraction task.
//! The Chrome renderer launches a dedicated browser process with its own
//! profile directory for every context, so nothing is shared between tasks.

use crate::extract::consent::{click_script, presence_script, ConsentStrategy};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

/// Rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),
}

/// Launch options for one rendering context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub headless: bool,
    pub proxy: Option<String>,
    pub browser_path: Option<PathBuf>,
}

/// Opens rendering contexts
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self, options: &RenderOptions) -> Result<Box<dyn RenderContext>, RenderError>;
}

/// One page in one isolated browser
///
/// Callers must call [`RenderContext::close`] on every path.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Loads `url`, failing if it takes longer than `timeout`
    async fn navigate(&self, url: &Url, timeout: Duration) -> Result<(), RenderError>;

    /// Tries the strategies up to `passes` times; true once a banner was dismissed
    async fn dismiss_consent(&self, strategies: &[ConsentStrategy], passes: u32) -> bool;

    /// Scrolls to the bottom until the page height stops changing or
    /// `max_scrolls` is reached; returns the number of scrolls that grew the page
    async fn scroll(&self, pause: Duration, max_scrolls: u32) -> Result<u32, RenderError>;

    /// Visible body text without script, style and navigation chrome
    async fn read_visible_text(&self) -> Result<String, RenderError>;

    /// PNG screenshot of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>, RenderError>;

    /// Releases the browser; safe to call more than once
    async fn close(&mut self);
}

const PAGE_HEIGHT_SCRIPT: &str = "document.body ? document.body.scrollHeight : 0";

const SCROLL_TO_BOTTOM_SCRIPT: &str =
    "window.scrollTo(0, document.body ? document.body.scrollHeight : 0); true";

const VISIBLE_TEXT_SCRIPT: &str = r#"(() => {
  if (!document.body) return "";
  document
    .querySelectorAll("script, style, noscript, template, nav, header, footer, aside")
    .forEach((el) => el.remove());
  return document.body.innerText || document.body.textContent || "";
})()"#;

/// Pause after a consent click before checking that the banner is gone
const CONSENT_CLICK_PAUSE: Duration = Duration::from_secs(1);

static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `Renderer` that launches a fresh Chrome/Chromium per context
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeRenderer;

impl ChromeRenderer {
    /// Explicit path, then `CHROMIUM_PATH`, then chromiumoxide's own lookup
    fn executable(options: &RenderOptions) -> Option<PathBuf> {
        options.browser_path.clone().or_else(|| {
            std::env::var_os("CHROMIUM_PATH")
                .map(PathBuf::from)
                .filter(|path| path.exists())
        })
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn open(&self, options: &RenderOptions) -> Result<Box<dyn RenderContext>, RenderError> {
        let user_data_dir = std::env::temp_dir().join(format!(
            "sumi_glean_chrome_{}_{}",
            std::process::id(),
            CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|e| RenderError::Launch(format!("cannot create profile directory: {}", e)))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .user_data_dir(&user_data_dir)
            .request_timeout(Duration::from_secs(30))
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if let Some(path) = Self::executable(options) {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(RenderError::Launch)?;

        tracing::debug!("Launching browser with profile {}", user_data_dir.display());
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler event error: {}", e);
                }
            }
        });

        let mut context = ChromeContext {
            browser,
            page: None,
            handler_task,
            user_data_dir,
            closed: false,
        };

        match context.browser.new_page("about:blank").await {
            Ok(page) => {
                context.page = Some(page);
                Ok(Box::new(context))
            }
            Err(e) => {
                context.close().await;
                Err(RenderError::Launch(format!("cannot open page: {}", e)))
            }
        }
    }
}

/// A Chrome process with a single page
pub struct ChromeContext {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
    closed: bool,
}

impl ChromeContext {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::Script("page is closed".to_string()))
    }

    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T, RenderError> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| RenderError::Script(e.to_string()))
    }
}

#[async_trait]
impl RenderContext for ChromeContext {
    async fn navigate(&self, url: &Url, timeout: Duration) -> Result<(), RenderError> {
        let page = self.page()?;
        let load = async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RenderError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(RenderError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    async fn dismiss_consent(&self, strategies: &[ConsentStrategy], passes: u32) -> bool {
        if strategies.is_empty() {
            return false;
        }

        let click = click_script(strategies);
        let present = presence_script(strategies);

        for pass in 1..=passes.max(1) {
            match self.evaluate::<bool>(&click).await {
                Ok(true) => {
                    tokio::time::sleep(CONSENT_CLICK_PAUSE).await;
                    match self.evaluate::<bool>(&present).await {
                        Ok(false) => {
                            tracing::debug!("Consent banner dismissed on pass {}", pass);
                            return true;
                        }
                        Ok(true) => tracing::debug!("Consent banner still present after pass {}", pass),
                        Err(e) => tracing::debug!("Consent presence check failed: {}", e),
                    }
                }
                Ok(false) => {
                    tracing::debug!("No consent button found on pass {}", pass);
                    tokio::time::sleep(CONSENT_CLICK_PAUSE).await;
                }
                Err(e) => tracing::debug!("Consent script failed on pass {}: {}", pass, e),
            }
        }

        false
    }

    async fn scroll(&self, pause: Duration, max_scrolls: u32) -> Result<u32, RenderError> {
        let mut last_height: f64 = self.evaluate(PAGE_HEIGHT_SCRIPT).await?;
        let mut scrolls = 0;

        while scrolls < max_scrolls {
            self.evaluate::<bool>(SCROLL_TO_BOTTOM_SCRIPT).await?;
            tokio::time::sleep(pause).await;

            let height: f64 = self.evaluate(PAGE_HEIGHT_SCRIPT).await?;
            if height <= last_height {
                break;
            }
            last_height = height;
            scrolls += 1;
        }

        Ok(scrolls)
    }

    async fn read_visible_text(&self) -> Result<String, RenderError> {
        self.evaluate(VISIBLE_TEXT_SCRIPT).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, RenderError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        self.page()?
            .screenshot(params)
            .await
            .map_err(|e| RenderError::Screenshot(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::trace!("Page close failed: {}", e);
            }
        }
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Waiting for browser exit failed: {}", e);
        }
        self.handler_task.abort();

        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            tracing::trace!(
                "Could not remove profile {}: {}",
                self.user_data_dir.display(),
                e
            );
        }
        self.closed = true;
    }
}
