//! Page engines.
//!
//! The scraper depends only on the capability set `{goto, extract,
//! extract_all, exists, current_url, close}`; the concrete engine is chosen
//! per shop config and injected. Both engines snapshot the document after
//! navigation, so extraction is uniform and synchronous.

mod headless;
mod static_html;

use std::time::Duration;

use async_trait::async_trait;
use cardwatch_core::{EngineKind, Selector};

pub use headless::HeadlessEngine;
pub use static_html::StaticEngine;

use crate::error::ScrapeError;
use crate::extract::Document;

/// Retry settings for transient navigation failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay_secs: 1,
            max_delay_secs: 300,
        }
    }
}

/// Everything an engine needs beyond the shop config itself.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub action_timeout: Duration,
    pub retry: RetryPolicy,
    /// Proxy the engine's transport is bound to, when the shop's governor
    /// routes through one.
    pub proxy_url: Option<String>,
}

impl EngineSettings {
    #[must_use]
    pub fn new(user_agent: &str) -> Self {
        EngineSettings {
            user_agent: user_agent.to_string(),
            navigation_timeout: Duration::from_secs(15),
            action_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            proxy_url: None,
        }
    }
}

/// Capability set the scraper algorithm is written against.
#[async_trait]
pub trait PageEngine: Send {
    /// Navigates to `url` and snapshots the resulting document. Transient
    /// failures are retried per the engine's [`RetryPolicy`].
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError>;

    /// The snapshot taken by the last successful [`PageEngine::goto`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::NoDocument`] before the first navigation.
    fn document(&self) -> Result<&Document, ScrapeError>;

    /// URL of the current document after redirects, when one is loaded.
    fn current_url(&self) -> Option<&str> {
        self.document().ok().map(Document::url)
    }

    /// Releases engine resources. Idempotent; called on every exit path.
    async fn close(&mut self) -> Result<(), ScrapeError>;

    fn extract(&self, selector: &Selector) -> Option<String> {
        self.document().ok().and_then(|doc| doc.extract(selector))
    }

    fn extract_all(&self, selector: &Selector) -> Vec<Document> {
        self.document()
            .ok()
            .map(|doc| doc.select_fragments(selector))
            .unwrap_or_default()
    }

    fn exists(&self, selector: &Selector) -> bool {
        self.document().ok().is_some_and(|doc| doc.exists(selector))
    }
}

/// Builds the engine a shop config asks for.
///
/// # Errors
///
/// Returns [`ScrapeError`] when the HTTP client cannot be constructed or the
/// browser fails to launch.
pub async fn create_engine(
    kind: EngineKind,
    settings: &EngineSettings,
) -> Result<Box<dyn PageEngine>, ScrapeError> {
    match kind {
        EngineKind::StaticHtml => Ok(Box::new(StaticEngine::new(settings)?)),
        EngineKind::HeadlessBrowser => Ok(Box::new(HeadlessEngine::launch(settings).await?)),
    }
}
