//! Headless-browser engine backed by Chromium over CDP.
//!
//! Renders JavaScript before snapshotting, and blocks image/font/stylesheet/
//! analytics requests so a scrape costs a fraction of a full page load.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::page::Page;
use futures::StreamExt;

use crate::engine::{EngineSettings, PageEngine, RetryPolicy};
use crate::error::ScrapeError;
use crate::extract::Document;
use crate::retry::retry_with_backoff;

/// Request patterns never worth paying for during a scrape.
fn blocked_url_patterns() -> Vec<String> {
    [
        "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.css", "*.woff",
        "*.woff2", "*.ttf", "*.otf", "*google-analytics.com*", "*googletagmanager.com*",
        "*doubleclick.net*", "*facebook.net*", "*hotjar.com*",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

pub struct HeadlessEngine {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Option<Page>,
    document: Option<Document>,
    retry: RetryPolicy,
    navigation_timeout: Duration,
    action_timeout: Duration,
    closed: bool,
}

impl HeadlessEngine {
    /// Launches a headless Chromium and the CDP event pump.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Browser`] when the browser cannot be launched.
    pub async fn launch(settings: &EngineSettings) -> Result<Self, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .arg(format!("--user-agent={}", settings.user_agent))
            .arg("--disable-gpu")
            .arg("--window-size=1280,960");
        if let Some(proxy_url) = &settings.proxy_url {
            builder = builder.arg(format!("--proxy-server={proxy_url}"));
        }
        let config = builder.build().map_err(ScrapeError::browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(ScrapeError::browser)?;

        // The handler must be polled for the CDP connection to make progress;
        // it ends when the browser closes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(HeadlessEngine {
            browser,
            handler_task,
            page: None,
            document: None,
            retry: settings.retry,
            navigation_timeout: settings.navigation_timeout,
            action_timeout: settings.action_timeout,
            closed: false,
        })
    }

    /// Returns the single page this engine navigates with, creating it (and
    /// installing the resource blocklist) on first use.
    async fn ensure_page(&mut self) -> Result<Page, ScrapeError> {
        if let Some(page) = &self.page {
            return Ok(page.clone());
        }
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(ScrapeError::browser)?;
        page.execute(SetBlockedUrLsParams::new(blocked_url_patterns()))
            .await
            .map_err(ScrapeError::browser)?;
        self.page = Some(page.clone());
        Ok(page)
    }
}

#[async_trait]
impl PageEngine for HeadlessEngine {
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError> {
        if self.closed {
            return Err(ScrapeError::Closed);
        }
        let page = self.ensure_page().await?;
        let retry = self.retry;
        let navigation_timeout = self.navigation_timeout;
        let action_timeout = self.action_timeout;

        let document = retry_with_backoff(&retry, || {
            let page = page.clone();
            let url = url.to_owned();
            async move {
                let navigated = tokio::time::timeout(navigation_timeout, async {
                    page.goto(url.clone()).await.map_err(ScrapeError::browser)?;
                    page.wait_for_navigation()
                        .await
                        .map_err(ScrapeError::browser)?;
                    Ok::<(), ScrapeError>(())
                })
                .await;
                match navigated {
                    Ok(result) => result?,
                    Err(_) => return Err(ScrapeError::Timeout { url }),
                }

                let html = tokio::time::timeout(action_timeout, page.content())
                    .await
                    .map_err(|_| ScrapeError::Timeout { url: url.clone() })?
                    .map_err(ScrapeError::browser)?;
                let current_url = tokio::time::timeout(action_timeout, page.url())
                    .await
                    .map_err(|_| ScrapeError::Timeout { url: url.clone() })?
                    .map_err(ScrapeError::browser)?
                    .unwrap_or(url);

                Ok(Document::new(current_url, html))
            }
        })
        .await?;

        self.document = Some(document);
        Ok(())
    }

    fn document(&self) -> Result<&Document, ScrapeError> {
        if self.closed {
            return Err(ScrapeError::Closed);
        }
        self.document.as_ref().ok_or(ScrapeError::NoDocument)
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page = None;
        self.document = None;

        let close_result = self.browser.close().await;
        // Reap the child process; a failed close still gets the kill-on-drop
        // path, so only log here.
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "browser did not exit cleanly");
        }
        self.handler_task.abort();
        close_result.map_err(ScrapeError::browser)?;
        Ok(())
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        // Browser drop kills the child process; the event pump must not
        // outlive it.
        self.handler_task.abort();
    }
}
