//! Product observation types shared by the scraper and the result store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One observation of a product at a shop.
///
/// Results are keyed by `(product_id, shop_id, hour_bucket)` in the store;
/// a later observation within the same UTC hour overwrites the earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductResult {
    pub product_id: String,
    pub shop_id: String,
    /// Absolute URL of the page the observation was taken from.
    pub product_url: String,
    /// Parsed price; `None` when the shop exposes availability without a
    /// parseable price.
    pub price: Option<Decimal>,
    pub is_available: bool,
    pub timestamp: DateTime<Utc>,
}

impl ProductResult {
    /// An unavailable, unpriced observation — the shape emitted on scrape
    /// failure and on match-policy misses.
    #[must_use]
    pub fn unavailable(product_id: &str, shop_id: &str, product_url: &str) -> Self {
        ProductResult {
            product_id: product_id.to_string(),
            shop_id: shop_id.to_string(),
            product_url: product_url.to_string(),
            price: None,
            is_available: false,
            timestamp: Utc::now(),
        }
    }

    /// The UTC hour bucket this observation falls into.
    #[must_use]
    pub fn hour_bucket(&self) -> String {
        hour_bucket(self.timestamp)
    }
}

/// Formats a timestamp as its UTC hour bucket, e.g. `"2026-08-01T14"`.
#[must_use]
pub fn hour_bucket(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H").to_string()
}
