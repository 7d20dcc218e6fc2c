//! Page inspection capability.
//!
//! [`PageInspector`] turns a URL into a [`Document`] that can be queried
//! with CSS selectors. [`ChromiumInspector`] renders the page in a headless
//! browser; [`HttpInspector`] only fetches the served HTML;
//! [`InMemoryInspector`] serves scripted pages for offline checks and tests.
//!
//! [`ChromiumInspector`]: crate::services::ChromiumInspector

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Config, RenderEngine};
use crate::services::browser::ChromiumInspector;
use crate::utils::{http, normalize_whitespace};

/// Something that can render a URL into an inspectable document.
#[async_trait]
pub trait PageInspector: Send + Sync {
    /// Render `url`, giving up after `timeout`.
    async fn open(&self, url: &str, timeout: Duration) -> Result<Document>;

    /// Release a document obtained from [`PageInspector::open`].
    fn close(&self, document: Document) {
        drop(document);
    }
}

/// A rendered page.
pub struct Document {
    url: String,
    html: Html,
}

impl Document {
    /// Parse raw HTML served from `url`.
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(html),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// First element matching `selector`, if any.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Element<'_>>> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).next().map(Element::new))
    }
}

/// An element inside a [`Document`].
#[derive(Clone, Copy)]
pub struct Element<'a> {
    inner: ElementRef<'a>,
}

impl<'a> Element<'a> {
    fn new(inner: ElementRef<'a>) -> Self {
        Self { inner }
    }

    /// Text content with whitespace collapsed.
    pub fn text(&self) -> String {
        normalize_whitespace(&self.inner.text().collect::<String>())
    }

    /// Value of attribute `name`; boolean attributes yield `Some("")`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.value().attr(name).map(str::to_string)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.value().attr(name).is_some()
    }

    /// All descendants matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let sel = parse_selector(selector)?;
        Ok(self.inner.select(&sel).map(Element::new).collect())
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Inspector for live pages, chosen by `render.engine`.
pub fn live_inspector(config: &Config) -> Result<Arc<dyn PageInspector>> {
    match config.render.engine {
        RenderEngine::Chromium => {
            let browser = ChromiumInspector::new(&config.render, config.http.user_agent.clone())?;
            Ok(Arc::new(browser))
        }
        RenderEngine::Static => {
            log::info!("Static rendering: client-side scripts will not run");
            let client = http::create_async_client(&config.http)?;
            Ok(Arc::new(HttpInspector::new(client)))
        }
    }
}

/// Fetches pages over HTTP and parses the served HTML.
pub struct HttpInspector {
    client: Client,
}

impl HttpInspector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageInspector for HttpInspector {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Document> {
        log::debug!("Opening page: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_request_error(url, timeout, e))?;

        let status = response.status();
        if is_retryable_status(status) {
            return Err(AppError::Navigation {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            log::warn!("Page {} answered HTTP {}; inspecting anyway", url, status);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(url, timeout, e))?;

        Ok(Document::parse(url, &body))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_request_error(url: &str, timeout: Duration, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        AppError::render(url, error)
    }
}

/// A scripted response of [`InMemoryInspector`].
#[derive(Debug, Clone)]
pub enum ScriptedPage {
    /// Serve this HTML.
    Html(String),
    /// Fail as if the network or renderer broke.
    RenderFailure(String),
    /// Fail as if the page never finished loading.
    Timeout,
}

/// Serves pages from memory.
///
/// Each URL holds a queue of responses; the last one repeats once the
/// queue drains. Opens and closes are counted.
#[derive(Default)]
pub struct InMemoryInspector {
    pages: Mutex<HashMap<String, VecDeque<ScriptedPage>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl InMemoryInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url` on every open.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.script(url, [ScriptedPage::Html(html.into())])
    }

    /// Serve `responses` for `url`, one per open.
    pub fn script(
        self,
        url: impl Into<String>,
        responses: impl IntoIterator<Item = ScriptedPage>,
    ) -> Self {
        if let Ok(mut pages) = self.pages.lock() {
            pages
                .entry(url.into())
                .or_default()
                .extend(responses);
        }
        self
    }

    /// Number of successful or failed `open` calls.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of documents released.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> Result<ScriptedPage> {
        let mut pages = self
            .pages
            .lock()
            .map_err(|_| AppError::render(url, "page script lock poisoned"))?;
        let queue = pages
            .get_mut(url)
            .ok_or_else(|| AppError::render(url, "no such page"))?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| AppError::render(url, "no such page"))
    }
}

#[async_trait]
impl PageInspector for InMemoryInspector {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Document> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match self.next_response(url)? {
            ScriptedPage::Html(html) => Ok(Document::parse(url, &html)),
            ScriptedPage::RenderFailure(message) => Err(AppError::render(url, message)),
            ScriptedPage::Timeout => Err(AppError::Timeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    fn close(&self, document: Document) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        drop(document);
    }
}
