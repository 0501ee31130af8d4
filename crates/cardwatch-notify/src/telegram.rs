//! Telegram channel adapter, speaking the Bot API's `sendMessage` method.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::channel::{ChannelAdapter, NotificationPayload};
use crate::error::NotifyError;
use crate::render::render_message;

pub struct TelegramChannel {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl TelegramChannel {
    /// Builds the adapter against the public Bot API.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(bot_token: &str) -> Result<Self, NotifyError> {
        Self::with_api_base(bot_token, "https://api.telegram.org")
    }

    /// Same as [`TelegramChannel::new`] with an overridable API origin, for
    /// tests against a local server.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn with_api_base(bot_token: &str, api_base: &str) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(TelegramChannel {
            http,
            bot_token: bot_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(
        &self,
        channel_target: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": channel_target,
                "text": render_message(payload),
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery {
                channel: "telegram",
                channel_target: channel_target.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(())
    }
}
