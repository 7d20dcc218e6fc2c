// src/services/browser.rs

//! Headless Chromium renderer.
//!
//! The product page builds its purchase controls client-side, so the served
//! HTML alone is not enough. Each open launches a browser, loads the page,
//! waits for the network to go quiet plus a settle delay, then hands the
//! rendered DOM to [`Document::parse`]. The browser is closed on every path.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;

use crate::error::{AppError, Result};
use crate::models::RenderConfig;
use crate::services::inspector::{Document, PageInspector};

/// How often the page is asked about its network activity.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// How long the resource count must hold still to call the page idle.
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Number of loaded resources once the document is complete, `-1` before.
const RESOURCE_COUNT_JS: &str = "document.readyState === 'complete' \
     ? performance.getEntriesByType('resource').length : -1";

/// Renders pages in a fresh headless Chromium per open.
#[derive(Debug, Clone)]
pub struct ChromiumInspector {
    executable: Option<PathBuf>,
    no_sandbox: bool,
    settle: Duration,
    user_agent: String,
}

impl ChromiumInspector {
    /// Fails when no Chromium binary can be found.
    pub fn new(config: &RenderConfig, user_agent: impl Into<String>) -> Result<Self> {
        let inspector = Self {
            executable: config.executable.clone(),
            no_sandbox: config.no_sandbox,
            settle: config.settle(),
            user_agent: user_agent.into(),
        };
        inspector.browser_config()?;
        Ok(inspector)
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder();
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder
            .build()
            .map_err(|e| AppError::config(format!("Chromium is not usable: {e}")))
    }

    async fn render(&self, browser: &Browser, url: &str) -> Result<String> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::render(url, e))?;
        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| AppError::render(url, e))?;
        page.goto(url).await.map_err(|e| AppError::render(url, e))?;

        wait_for_network_idle(&page, url).await?;
        tokio::time::sleep(self.settle).await;

        let html = page.content().await.map_err(|e| AppError::render(url, e))?;
        if let Err(e) = page.close().await {
            log::debug!("Closing tab for {} failed: {}", url, e);
        }
        Ok(html)
    }
}

#[async_trait]
impl PageInspector for ChromiumInspector {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Document> {
        log::debug!("Rendering page: {}", url);

        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| AppError::render(url, e))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Chromium event error: {}", e);
                }
            }
        });

        let rendered = tokio::time::timeout(timeout, self.render(&browser, url)).await;

        if let Err(e) = browser.close().await {
            log::warn!("Closing Chromium failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            log::warn!("Waiting for Chromium to exit failed: {}", e);
        }
        events.abort();

        let html = rendered.map_err(|_| AppError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        })??;

        Ok(Document::parse(url, &html))
    }
}

/// Poll until the page has loaded and stopped fetching resources.
async fn wait_for_network_idle(page: &Page, url: &str) -> Result<()> {
    let mut idle = IdleTracker::default();
    loop {
        let count: i64 = page
            .evaluate(RESOURCE_COUNT_JS)
            .await
            .map_err(|e| AppError::render(url, e))?
            .into_value()?;
        if idle.observe(count, IDLE_POLL) {
            return Ok(());
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
}

/// Tracks how long the resource count has held still.
#[derive(Debug, Default)]
struct IdleTracker {
    last: Option<i64>,
    quiet: Duration,
}

impl IdleTracker {
    /// Record a sample taken `step` after the previous one; true once idle.
    fn observe(&mut self, count: i64, step: Duration) -> bool {
        if count < 0 {
            self.last = None;
            self.quiet = Duration::ZERO;
            return false;
        }
        if self.last == Some(count) {
            self.quiet += step;
        } else {
            self.last = Some(count);
            self.quiet = Duration::ZERO;
        }
        self.quiet >= NETWORK_IDLE_WINDOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RenderEngine;

    fn samples(tracker: &mut IdleTracker, counts: &[i64]) -> Vec<bool> {
        counts
            .iter()
            .map(|c| tracker.observe(*c, IDLE_POLL))
            .collect()
    }

    #[test]
    fn test_idle_after_count_holds_for_window() {
        let mut tracker = IdleTracker::default();
        assert_eq!(samples(&mut tracker, &[3, 3, 3]), vec![false, false, true]);
    }

    #[test]
    fn test_new_resources_restart_window() {
        let mut tracker = IdleTracker::default();
        assert_eq!(
            samples(&mut tracker, &[3, 3, 5, 5, 5]),
            vec![false, false, false, false, true]
        );
    }

    #[test]
    fn test_loading_document_is_never_idle() {
        let mut tracker = IdleTracker::default();
        assert_eq!(
            samples(&mut tracker, &[-1, -1, -1, 0, 0, 0]),
            vec![false, false, false, false, false, true]
        );
    }

    /// Needs a local Chromium: `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_renders_client_side_button() {
        let config = RenderConfig {
            engine: RenderEngine::Chromium,
            no_sandbox: true,
            settle_ms: 200,
            ..RenderConfig::default()
        };
        let inspector = ChromiumInspector::new(&config, "stockwatch-test").unwrap();
        let url = "data:text/html,<div%20id=app></div><script>\
                   setTimeout(()=>{document.getElementById('app').innerHTML=\
                   '<button%20class=\"btn-lg\">Buy</button>'},50)</script>";

        let doc = inspector.open(url, Duration::from_secs(30)).await.unwrap();

        let button = doc.query_selector("button.btn-lg").unwrap().unwrap();
        assert_eq!(button.text(), "Buy");
    }
}
