//! Integration tests for discovery and full crawl sessions
//!
//! These tests use wiremock to create mock HTTP servers. Rendering and
//! language detection are replaced by in-memory fakes so that no browser is
//! needed.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_glean::config::{Config, CrawlConfig, Isolation};
use sumi_glean::crawler::{discover_links, Coordinator, HttpFetcher, Sleeper};
use sumi_glean::extract::{
    ConsentStrategy, DocumentTextExtractor, ExtractError, ExtractionOutcome, ExtractionWorker,
    InProcessRunner, LanguageDetector, RenderContext, RenderError, RenderOptions, Renderer,
};
use sumi_glean::robots::{fetch_robots, RobotsPolicy};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a discovery configuration without politeness or backoff delays
fn create_test_crawl_config(base_url: &str) -> CrawlConfig {
    CrawlConfig {
        base_url: base_url.to_string(),
        max_pages: 20,
        max_threads: 4,
        respect_robots: false,
        fetch_timeout: 5,
        retry_attempts: 2,
        retry_base_delay: 0,
        retry_max_jitter: 0,
        politeness_min_delay: 0,
        politeness_max_delay: 0,
    }
}

fn fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new("TestBot/1.0", Duration::from_secs(5)).unwrap())
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!("<html><body>{}</body></html>", body))
}

async fn mount_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_discovery_collapses_equivalent_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/a">a</a>
           <a href="/a/">a slash</a>
           <a href="/a?x=2&y=1">a query</a>
           <a href="/a?y=1&x=2">a query reordered</a>
           <a href="https://other.com/b">elsewhere</a>"#
            .to_string(),
    )
    .await;
    mount_page(&server, "/a", "<p>a</p>".to_string()).await;

    let output = discover_links(fetcher(), &create_test_crawl_config(&base), "TestBot")
        .await
        .unwrap();

    let links: Vec<String> = output.links.iter().map(|u| u.to_string()).collect();
    let with_query = format!("{}/a?x=2&y=1", base);

    assert_eq!(links.iter().filter(|l| **l == with_query).count(), 1);
    assert_eq!(links.iter().filter(|l| l.ends_with("/a")).count(), 1);
    assert!(links.iter().all(|l| !l.contains("other.com")));
    assert_eq!(links.len(), 3);
    assert!(output.errors.is_empty());
}

#[tokio::test]
async fn test_discovery_respects_page_budget() {
    let server = MockServer::start().await;
    let base = server.uri();

    let anchors: String = (0..10)
        .map(|i| format!(r#"<a href="/page{}">{}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", anchors).await;

    let mut config = create_test_crawl_config(&base);
    config.max_pages = 1;
    config.max_threads = 10;

    let output = discover_links(fetcher(), &config, "TestBot").await.unwrap();

    assert_eq!(output.links.len(), 1);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_discovery_honors_robots_txt() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<a href="/public">public</a><a href="/private">private</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/public", "<p>public</p>".to_string()).await;
    mount_page(&server, "/private", "<p>private</p>".to_string()).await;

    let mut config = create_test_crawl_config(&base);
    config.respect_robots = true;

    let output = discover_links(fetcher(), &config, "TestBot").await.unwrap();

    let links: Vec<String> = output.links.iter().map(|u| u.to_string()).collect();
    assert!(links.contains(&format!("{}/public", base)));
    assert!(!links.iter().any(|l| l.contains("/private")));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/private"));
}

#[tokio::test]
async fn test_discovery_ignores_broken_robots_txt() {
    for status in [404u16, 500] {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        mount_page(&server, "/", r#"<a href="/page">page</a>"#.to_string()).await;
        mount_page(&server, "/page", "<p>page</p>".to_string()).await;

        let mut config = create_test_crawl_config(&base);
        config.respect_robots = true;

        let output = discover_links(fetcher(), &config, "TestBot").await.unwrap();

        assert_eq!(output.links.len(), 2, "robots.txt status {}", status);
        assert!(output.errors.is_empty());
    }
}

#[tokio::test]
async fn test_unreachable_robots_txt_allows_everything() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let origin = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let rules = fetch_robots(fetcher().as_ref(), &origin, "TestBot").await;

    assert!(rules.can_fetch(&origin.join("/private/page").unwrap()));
    assert_eq!(rules.crawl_delay(), None);
}

#[tokio::test]
async fn test_discovery_reports_exhausted_retries() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/flaky">flaky</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let output = discover_links(fetcher(), &create_test_crawl_config(&base), "TestBot")
        .await
        .unwrap();

    assert_eq!(output.links.len(), 1);
    assert_eq!(output.errors.len(), 1);
    assert_eq!(output.errors[0].url.path(), "/flaky");
    assert!(output.errors[0].cause.contains("503"));
}

#[tokio::test]
async fn test_discovery_skips_non_html() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/feed">feed</a><a href="/brochure.pdf">pdf</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{}"),
        )
        .mount(&server)
        .await;

    let output = discover_links(fetcher(), &create_test_crawl_config(&base), "TestBot")
        .await
        .unwrap();

    assert_eq!(output.links.len(), 1);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/brochure.pdf"));
}

/// Serves text by URL path: `/short` is short, everything else is long
struct FakeRenderer;

struct FakeContext {
    url: Mutex<Option<Url>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn open(&self, _options: &RenderOptions) -> Result<Box<dyn RenderContext>, RenderError> {
        Ok(Box::new(FakeContext {
            url: Mutex::new(None),
        }))
    }
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&self, url: &Url, _timeout: Duration) -> Result<(), RenderError> {
        *self.url.lock().unwrap() = Some(url.clone());
        Ok(())
    }

    async fn dismiss_consent(&self, _strategies: &[ConsentStrategy], _passes: u32) -> bool {
        false
    }

    async fn scroll(&self, _pause: Duration, _max_scrolls: u32) -> Result<u32, RenderError> {
        Ok(1)
    }

    async fn read_visible_text(&self) -> Result<String, RenderError> {
        let url = self.url.lock().unwrap().clone();
        match url {
            Some(url) if url.path() == "/short" => Ok("Too short to keep.".to_string()),
            Some(url) => Ok(format!("Readable text from {}. {}", url.path(), "Lorem ipsum dolor sit amet. ".repeat(20))),
            None => Err(RenderError::Script("nothing loaded".to_string())),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, RenderError> {
        Ok(Vec::new())
    }

    async fn close(&mut self) {}
}

struct AlwaysEnglish;

impl LanguageDetector for AlwaysEnglish {
    fn detect(&self, _text: &str) -> Option<String> {
        Some("en".to_string())
    }
}

struct PlainTextDocuments;

impl DocumentTextExtractor for PlainTextDocuments {
    fn extract_text(&self, bytes: &[u8], _max_pages: usize) -> Result<String, ExtractError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

fn create_test_config(base_url: &str, out: &TempDir) -> Config {
    let mut config = Config::default();
    config.crawl = create_test_crawl_config(base_url);
    config.extraction.isolation = Isolation::InProcess;
    config.extraction.max_workers = Some(2);
    config.extraction.settle_delay = 0;
    config.extraction.scroll_pause = 0;
    config.output.directory = out.path().join("text");
    config.output.summary_path = Some(out.path().join("summary.md"));
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

fn fake_runner() -> Arc<InProcessRunner> {
    let worker = ExtractionWorker::new(
        Arc::new(FakeRenderer),
        Arc::new(PlainTextDocuments),
        Arc::new(AlwaysEnglish),
    )
    .with_sleeper(Arc::new(NoSleep));
    Arc::new(InProcessRunner::new(worker))
}

#[tokio::test]
async fn test_full_session_with_fake_browser() {
    let server = MockServer::start().await;
    let base = server.uri();
    let out = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<a href="/long">long</a><a href="/short">short</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/long", "<p>long</p>".to_string()).await;
    mount_page(&server, "/short", "<p>short</p>".to_string()).await;

    let report = Coordinator::new(create_test_config(&base, &out), fake_runner())
        .unwrap()
        .with_config_hash("cafebabe")
        .run()
        .await
        .unwrap();

    assert_eq!(report.links.len(), 3);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.texts.len(), 2);
    assert!(report.failed.contains(&format!("{}/short", base)));

    let all = report.text_by_url();
    assert_eq!(all.len(), 3);
    assert_eq!(all[&format!("{}/short", base)], "");

    assert_eq!(report.saved_files.len(), 2);
    for file in &report.saved_files {
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name
            .trim_end_matches(".txt")
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert!(std::fs::read_to_string(file)
            .unwrap()
            .starts_with("Readable text from"));
    }

    let summary = std::fs::read_to_string(out.path().join("summary.md")).unwrap();
    assert!(summary.contains("cafebabe"));
    assert!(summary.contains("rejected: too short"));
}

#[tokio::test]
async fn test_document_base_url_is_parsed_directly() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let document_text = "Annual report. ".repeat(40);

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_string(document_text.clone()),
        )
        .mount(&server)
        .await;

    let base = format!("{}/report.pdf", server.uri());
    let report = Coordinator::new(create_test_config(&base, &out), fake_runner())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(report.links.is_empty());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].outcome, ExtractionOutcome::Accepted);
    assert_eq!(report.texts[&base], document_text.trim());
}
