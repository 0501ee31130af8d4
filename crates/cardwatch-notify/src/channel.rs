//! The channel adapter contract.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::NotifyError;

/// Everything an adapter needs to render and send one alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub product_id: String,
    pub product_name: String,
    pub shop_id: String,
    pub shop_name: String,
    pub price: Decimal,
    pub max_price: Decimal,
    pub product_url: String,
}

/// Renders and delivers a payload via one chat channel.
///
/// Adapters are stateless across calls and safe for concurrent invocation;
/// the dispatcher guarantees a single user's messages never race within the
/// same chat by sending them sequentially.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Delivers one alert to `channel_target`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] when the channel rejects the message
    /// and [`NotifyError::Http`] on transport failure.
    async fn send(
        &self,
        channel_target: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}
