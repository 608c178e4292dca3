//! Extraction worker
//!
//! Turns one [`ExtractionTask`] into one [`ExtractionResult`]. Documents are
//! downloaded and parsed directly; everything else is rendered in a browser
//! context that belongs to this task alone and is closed on every path.

use crate::crawler::{fetch_raw, FetchError, HttpFetcher, RetryPolicy, Sleeper, TokioSleeper};
use crate::extract::document::{DocumentTextExtractor, PdfTextExtractor, DOCUMENT_FETCH_TIMEOUT};
use crate::extract::language::{LanguageDetector, WhatlangDetector};
use crate::extract::quality::{self, Verdict};
use crate::extract::render::{ChromeRenderer, RenderContext, RenderError, Renderer};
use crate::extract::task::{ExtractionResult, ExtractionTask};
use crate::extract::ExtractError;
use crate::url::{extract_domain, is_document_url};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

/// Extracts readable text from a single URL
#[derive(Clone)]
pub struct ExtractionWorker {
    renderer: Arc<dyn Renderer>,
    documents: Arc<dyn DocumentTextExtractor>,
    detector: Arc<dyn LanguageDetector>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
}

impl ExtractionWorker {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        documents: Arc<dyn DocumentTextExtractor>,
        detector: Arc<dyn LanguageDetector>,
    ) -> Self {
        Self {
            renderer,
            documents,
            detector,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
        }
    }

    /// Chrome for pages, pdf-extract for documents, whatlang for language
    pub fn chrome() -> Self {
        Self::new(
            Arc::new(ChromeRenderer),
            Arc::new(PdfTextExtractor),
            Arc::new(WhatlangDetector),
        )
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Retry policy for document downloads
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs one task to completion
    ///
    /// Never fails: every problem is folded into the returned result, whose
    /// text is empty unless the page passed the quality gate.
    pub async fn extract(&self, task: &ExtractionTask) -> ExtractionResult {
        let url = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping invalid URL {}: {}", task.url, e);
                return ExtractionResult::failed(&task.url, format!("invalid URL: {}", e));
            }
        };

        if is_document_url(&url) {
            self.extract_document(task, &url).await
        } else {
            self.extract_page(task, &url).await
        }
    }

    async fn extract_document(&self, task: &ExtractionTask, url: &Url) -> ExtractionResult {
        debug!("Fetching document {}", url);

        let fetcher = match HttpFetcher::new(&task.user_agent, DOCUMENT_FETCH_TIMEOUT) {
            Ok(fetcher) => fetcher,
            Err(e) => return ExtractionResult::failed(&task.url, format!("HTTP client: {}", e)),
        };

        let bytes = match self
            .retry
            .run(
                self.sleeper.as_ref(),
                || fetch_raw(&fetcher, url),
                FetchError::is_transient,
            )
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Document download failed for {}: {}", url, e);
                return ExtractionResult::failed(&task.url, e.to_string());
            }
        };

        let documents = Arc::clone(&self.documents);
        let max_pages = task.config.max_document_pages;
        let parsed =
            tokio::task::spawn_blocking(move || documents.extract_text(&bytes, max_pages)).await;

        let text = match parsed {
            Ok(Ok(raw)) => normalize_text(&raw),
            Ok(Err(e)) => {
                warn!("Could not read document {}: {}", url, e);
                return ExtractionResult::failed(&task.url, e.to_string());
            }
            Err(e) => {
                warn!("Document parser crashed on {}: {}", url, e);
                return ExtractionResult::failed(&task.url, format!("document parser crashed: {}", e));
            }
        };

        if text.is_empty() {
            warn!("Document {} contains no text", url);
            return ExtractionResult::failed(&task.url, "document contains no text");
        }

        info!("Extracted {} chars from document {}", text.chars().count(), url);
        ExtractionResult::accepted(&task.url, text)
    }

    async fn extract_page(&self, task: &ExtractionTask, url: &Url) -> ExtractionResult {
        let context = match self.renderer.open(&task.render_options()).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Could not start browser for {}: {}", url, e);
                return ExtractionResult::failed(&task.url, e.to_string());
            }
        };

        let mut context = OpenContext(Some(context));
        let result = match context.0.as_deref() {
            Some(open) => self.render_and_judge(open, task, url).await,
            None => ExtractionResult::failed(&task.url, "rendering context already released"),
        };

        context.close().await;
        result
    }

    async fn render_and_judge(
        &self,
        context: &dyn RenderContext,
        task: &ExtractionTask,
        url: &Url,
    ) -> ExtractionResult {
        match self.render_text(context, task, url).await {
            Ok(text) => self.judge(task, text),
            Err(e) => {
                warn!("Rendering failed for {}: {}", url, e);
                if task.config.screenshot_on_fail {
                    save_screenshot(context, &task.config.screenshot_dir, url).await;
                }
                ExtractionResult::failed(&task.url, e.to_string())
            }
        }
    }

    async fn render_text(
        &self,
        context: &dyn RenderContext,
        task: &ExtractionTask,
        url: &Url,
    ) -> Result<String, RenderError> {
        let config = &task.config;

        context.navigate(url, config.page_load_timeout()).await?;
        self.sleeper.sleep(config.settle_delay()).await;

        if !config.consent.is_empty() {
            let dismissed = context
                .dismiss_consent(&config.consent, config.consent_passes)
                .await;
            debug!("Consent banner on {} dismissed: {}", url, dismissed);
        }

        let scrolls = context
            .scroll(config.scroll_pause(), config.max_scrolls)
            .await?;
        debug!("Scrolled {} {} times", url, scrolls);

        let raw = context.read_visible_text().await?;
        Ok(normalize_text(&raw))
    }

    fn judge(&self, task: &ExtractionTask, text: String) -> ExtractionResult {
        let config = &task.config;
        let verdict = quality::accept(
            &text,
            config.min_content_length,
            &config.language,
            self.detector.as_ref(),
            config.language_detection_failure,
        );

        match verdict {
            Verdict::Accepted { language } => {
                if language.is_none() {
                    warn!("Language detection failed for {}, keeping text", task.url);
                }
                info!("Extracted {} chars from {}", text.chars().count(), task.url);
                ExtractionResult::accepted(&task.url, text)
            }
            Verdict::Rejected(reason) => {
                info!("Dropped {}: {}", task.url, reason);
                ExtractionResult::rejected(&task.url, reason)
            }
        }
    }

    /// Reads one JSON task from `input` and writes one JSON result to `output`
    pub async fn serve<R, W>(&self, mut input: R, mut output: W) -> Result<(), ExtractError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut message = Vec::new();
        input.read_to_end(&mut message).await?;
        let task: ExtractionTask = serde_json::from_slice(&message)?;

        let result = self.extract(&task).await;

        output.write_all(&serde_json::to_vec(&result)?).await?;
        output.flush().await?;
        Ok(())
    }
}

/// Owns an open rendering context until it has been closed
///
/// If the extraction is dropped first (a panic, a deadline, a cancelled
/// batch) the close runs on a background task instead.
struct OpenContext(Option<Box<dyn RenderContext>>);

impl OpenContext {
    async fn close(&mut self) {
        if let Some(context) = self.0.as_mut() {
            context.close().await;
        }
        self.0 = None;
    }
}

impl Drop for OpenContext {
    fn drop(&mut self) {
        let Some(mut context) = self.0.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Rendering context abandoned, closing it in the background");
                runtime.spawn(async move { context.close().await });
            }
            Err(_) => warn!("Rendering context abandoned outside a runtime and left open"),
        }
    }
}

/// Entry point of a `worker` child process
///
/// Interrupts are swallowed here: the parent decides when the batch is
/// cancelled and kills the child itself.
pub async fn serve_stdio(worker: &ExtractionWorker) -> Result<(), ExtractError> {
    tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ignoring interrupt in worker process");
        }
    });

    worker.serve(tokio::io::stdin(), tokio::io::stdout()).await
}

async fn save_screenshot(context: &dyn RenderContext, dir: &Path, url: &Url) {
    let bytes = match context.screenshot().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("No screenshot for {}: {}", url, e);
            return;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Cannot create screenshot directory {}: {}", dir.display(), e);
        return;
    }

    let path = dir.join(screenshot_name(url));
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => info!("Saved failure screenshot to {}", path.display()),
        Err(e) => warn!("Cannot write screenshot {}: {}", path.display(), e),
    }
}

/// `screenshot_<domain>.png`, dots replaced by underscores
fn screenshot_name(url: &Url) -> String {
    let domain = extract_domain(url).unwrap_or_else(|| "unknown".to_string());
    format!("screenshot_{}.png", domain.replace(['.', ':'], "_"))
}

/// Collapses whitespace inside each line and squeezes blank-line runs
///
/// Leading and trailing blank lines are dropped.
pub fn normalize_text(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
        } else {
            lines.push(collapsed);
            previous_blank = false;
        }
    }

    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::extract::consent::ConsentStrategy;
    use crate::extract::quality::RejectReason;
    use crate::extract::render::RenderOptions;
    use crate::extract::task::ExtractionOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Behavior {
        Normal,
        FailNavigation,
        PanicOnRead,
        StallOnScroll,
    }

    struct FakeRenderer {
        text: String,
        behavior: Behavior,
        counters: Arc<Counters>,
    }

    struct FakeContext {
        text: String,
        behavior: Behavior,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn open(&self, _options: &RenderOptions) -> Result<Box<dyn RenderContext>, RenderError> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext {
                text: self.text.clone(),
                behavior: self.behavior,
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    #[async_trait]
    impl RenderContext for FakeContext {
        async fn navigate(&self, url: &Url, _timeout: Duration) -> Result<(), RenderError> {
            if self.behavior == Behavior::FailNavigation {
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                });
            }
            Ok(())
        }

        async fn dismiss_consent(&self, _strategies: &[ConsentStrategy], _passes: u32) -> bool {
            true
        }

        async fn scroll(&self, _pause: Duration, _max_scrolls: u32) -> Result<u32, RenderError> {
            if self.behavior == Behavior::StallOnScroll {
                std::future::pending::<()>().await;
            }
            Ok(0)
        }

        async fn read_visible_text(&self) -> Result<String, RenderError> {
            if self.behavior == Behavior::PanicOnRead {
                panic!("renderer crashed while reading");
            }
            Ok(self.text.clone())
        }

        async fn screenshot(&self) -> Result<Vec<u8>, RenderError> {
            Ok(b"\x89PNG fake".to_vec())
        }

        async fn close(&mut self) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FixedDetector(Option<&'static str>);

    impl LanguageDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct FakeDocuments;

    impl DocumentTextExtractor for FakeDocuments {
        fn extract_text(&self, bytes: &[u8], _max_pages: usize) -> Result<String, ExtractError> {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn worker(text: &str, behavior: Behavior, language: Option<&'static str>) -> (ExtractionWorker, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let renderer = FakeRenderer {
            text: text.to_string(),
            behavior,
            counters: Arc::clone(&counters),
        };
        let worker = ExtractionWorker::new(
            Arc::new(renderer),
            Arc::new(FakeDocuments),
            Arc::new(FixedDetector(language)),
        )
        .with_sleeper(Arc::new(NoSleep))
        .with_retry(RetryPolicy::no_retry());
        (worker, counters)
    }

    fn task(url: &str, config: ExtractionConfig) -> ExtractionTask {
        ExtractionTask::new(url, config, None, "TestBot/1.0")
    }

    #[tokio::test]
    async fn test_short_text_is_rejected() {
        let (worker, counters) = worker(&"x".repeat(350), Behavior::Normal, Some("en"));
        let result = worker
            .extract(&task("https://example.com/short", ExtractionConfig::default()))
            .await;

        assert_eq!(result.text, "");
        assert_eq!(result.outcome, ExtractionOutcome::Rejected(RejectReason::TooShort));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_english_text_is_accepted() {
        let text = "word ".repeat(100);
        let (worker, counters) = worker(&text, Behavior::Normal, Some("en"));
        let result = worker
            .extract(&task("https://example.com/long", ExtractionConfig::default()))
            .await;

        assert!(result.is_accepted());
        assert_eq!(result.text, text.trim());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_language_is_rejected() {
        let (worker, _) = worker(&"wort ".repeat(100), Behavior::Normal, Some("de"));
        let result = worker
            .extract(&task("https://example.com/de", ExtractionConfig::default()))
            .await;

        assert_eq!(
            result.outcome,
            ExtractionOutcome::Rejected(RejectReason::LanguageMismatch)
        );
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn test_navigation_failure_saves_screenshot() {
        let dir = TempDir::new().unwrap();
        let mut config = ExtractionConfig::default();
        config.screenshot_dir = dir.path().join("shots");

        let (worker, counters) = worker("unused", Behavior::FailNavigation, Some("en"));
        let result = worker.extract(&task("https://www.example.com/page", config)).await;

        assert!(matches!(result.outcome, ExtractionOutcome::Failed(_)));
        assert!(result.text.is_empty());
        assert!(dir.path().join("shots/screenshot_www_example_com.png").exists());
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_screenshot_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = ExtractionConfig::default();
        config.screenshot_on_fail = false;
        config.screenshot_dir = dir.path().to_path_buf();

        let (worker, _) = worker("unused", Behavior::FailNavigation, Some("en"));
        worker.extract(&task("https://example.com/page", config)).await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Waits for a background close to land
    async fn closed_eventually(counters: &Counters) -> usize {
        for _ in 0..200 {
            if counters.closed.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        counters.closed.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_context_closed_after_panic() {
        let (worker, counters) = worker("unused", Behavior::PanicOnRead, Some("en"));
        let outcome = tokio::spawn(async move {
            worker
                .extract(&task("https://example.com/crash", ExtractionConfig::default()))
                .await
        })
        .await;

        assert!(outcome.unwrap_err().is_panic());
        assert_eq!(closed_eventually(&counters).await, 1);
    }

    #[tokio::test]
    async fn test_context_closed_when_extraction_is_abandoned() {
        let (worker, counters) = worker("unused", Behavior::StallOnScroll, Some("en"));
        let stalled = tokio::time::timeout(
            Duration::from_millis(50),
            worker.extract(&task("https://example.com/endless", ExtractionConfig::default())),
        )
        .await;

        assert!(stalled.is_err());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed_eventually(&counters).await, 1);
    }

    #[tokio::test]
    async fn test_document_skips_renderer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes("  Page   one \n\n\n\n Page two  ".as_bytes()),
            )
            .mount(&server)
            .await;

        let (worker, counters) = worker("unused", Behavior::Normal, None);
        let url = format!("{}/report.pdf", server.uri());
        let result = worker.extract(&task(&url, ExtractionConfig::default())).await;

        assert_eq!(result.outcome, ExtractionOutcome::Accepted);
        assert_eq!(result.text, "Page one\n\nPage two");
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_document_is_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (worker, _) = worker("unused", Behavior::Normal, None);
        let url = format!("{}/gone.pdf", server.uri());
        let result = worker.extract(&task(&url, ExtractionConfig::default())).await;

        assert!(matches!(result.outcome, ExtractionOutcome::Failed(_)));
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let (worker, counters) = worker("unused", Behavior::Normal, None);
        let result = worker.extract(&task("not a url", ExtractionConfig::default())).await;

        assert!(matches!(result.outcome, ExtractionOutcome::Failed(_)));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_serve_reads_task_and_writes_result() {
        let (worker, _) = worker(&"word ".repeat(100), Behavior::Normal, Some("en"));
        let input = serde_json::to_vec(&task("https://example.com/", ExtractionConfig::default())).unwrap();
        let mut output = Vec::new();

        worker
            .serve(std::io::Cursor::new(input), &mut output)
            .await
            .unwrap();

        let result: ExtractionResult = serde_json::from_slice(&output).unwrap();
        assert_eq!(result.url, "https://example.com/");
        assert!(result.is_accepted());
    }

    #[tokio::test]
    async fn test_serve_rejects_garbage() {
        let (worker, _) = worker("unused", Behavior::Normal, None);
        let mut output = Vec::new();
        let result = worker
            .serve(std::io::Cursor::new(b"{not json".to_vec()), &mut output)
            .await;
        assert!(matches!(result, Err(ExtractError::Message(_))));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("\n\n  Hello    world \n\n\n\nSecond\tline  \n \n"),
            "Hello world\n\nSecond line"
        );
        assert_eq!(normalize_text("   \n\t\n"), "");
    }

    #[test]
    fn test_screenshot_name() {
        let url = Url::parse("https://docs.example.org/a/b").unwrap();
        assert_eq!(screenshot_name(&url), "screenshot_docs_example_org.png");
    }
}
