//! Static-HTML engine: plain HTTP fetch, no JavaScript execution.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::engine::{EngineSettings, PageEngine, RetryPolicy};
use crate::error::ScrapeError;
use crate::extract::Document;
use crate::retry::retry_with_backoff;

pub struct StaticEngine {
    client: Client,
    retry: RetryPolicy,
    navigation_timeout: Duration,
    document: Option<Document>,
}

impl StaticEngine {
    /// Builds the engine with configured timeouts, `User-Agent`, and optional
    /// proxy binding.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid proxy URL).
    pub fn new(settings: &EngineSettings) -> Result<Self, ScrapeError> {
        let mut builder = Client::builder()
            .timeout(settings.navigation_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&settings.user_agent);

        if let Some(proxy_url) = &settings.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(StaticEngine {
            client: builder.build()?,
            retry: settings.retry,
            navigation_timeout: settings.navigation_timeout,
            document: None,
        })
    }
}

/// One GET, following redirects; the snapshot records the final URL so
/// direct-hit detection sees where the shop actually landed us.
async fn fetch_document(client: &Client, url: &str) -> Result<Document, ScrapeError> {
    let response = client
        .get(url)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
        )
        .header(reqwest::header::ACCEPT_LANGUAGE, "pl-PL,pl;q=0.9,en;q=0.8")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let final_url = response.url().to_string();
    let body = response.text().await?;
    Ok(Document::new(final_url, body))
}

#[async_trait]
impl PageEngine for StaticEngine {
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError> {
        let retry = self.retry;
        let navigation_timeout = self.navigation_timeout;
        let client = self.client.clone();

        let document = retry_with_backoff(&retry, || {
            let client = client.clone();
            let url = url.to_owned();
            async move {
                match tokio::time::timeout(navigation_timeout, fetch_document(&client, &url)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Timeout { url }),
                }
            }
        })
        .await?;

        self.document = Some(document);
        Ok(())
    }

    fn document(&self) -> Result<&Document, ScrapeError> {
        self.document.as_ref().ok_or(ScrapeError::NoDocument)
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        // Connection pool teardown happens on drop; nothing held open here.
        self.document = None;
        Ok(())
    }
}
