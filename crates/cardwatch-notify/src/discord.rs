//! Discord channel adapter, posting to a channel via the bot REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::channel::{ChannelAdapter, NotificationPayload};
use crate::error::NotifyError;
use crate::render::render_message;

pub struct DiscordChannel {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl DiscordChannel {
    /// Builds the adapter against the public Discord API.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(bot_token: &str) -> Result<Self, NotifyError> {
        Self::with_api_base(bot_token, "https://discord.com/api/v10")
    }

    /// Same as [`DiscordChannel::new`] with an overridable API origin, for
    /// tests against a local server.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn with_api_base(bot_token: &str, api_base: &str) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(DiscordChannel {
            http,
            bot_token: bot_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(
        &self,
        channel_target: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_target);
        let response = self
            .http
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token),
            )
            .json(&json!({ "content": render_message(payload) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery {
                channel: "discord",
                channel_target: channel_target.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(())
    }
}
