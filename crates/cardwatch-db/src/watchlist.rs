//! Read-side queries for watchers and their linked chat channels.
//!
//! The dispatcher preloads both maps in exactly two round-trips at cycle
//! start; no per-result queries happen afterwards.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A chat channel a user can receive alerts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Telegram,
    Discord,
}

impl Channel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Telegram => "telegram",
            Channel::Discord => "discord",
        }
    }

    /// Parses the persisted channel discriminator.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] for values outside the CHECK constraint.
    pub fn parse(value: &str) -> Result<Self, DbError> {
        match value {
            "telegram" => Ok(Channel::Telegram),
            "discord" => Ok(Channel::Discord),
            other => Err(DbError::Corrupt {
                column: "channel",
                reason: format!("unknown channel '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One active watchlist entry for a product.
#[derive(Debug, Clone, PartialEq)]
pub struct Watcher {
    pub user_id: String,
    pub max_price: Decimal,
}

/// One linked chat destination for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub channel: Channel,
    pub channel_target: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct WatcherRow {
    product_id: String,
    user_id: String,
    max_price: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TargetRow {
    user_id: String,
    channel: String,
    channel_target: String,
}

/// Returns active watchers grouped by product, one round-trip.
///
/// Products with no active watcher are absent from the map.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_active_watchers_by_product_ids(
    pool: &PgPool,
    product_ids: &[String],
) -> Result<HashMap<String, Vec<Watcher>>, DbError> {
    let rows = sqlx::query_as::<_, WatcherRow>(
        "SELECT product_id, user_id, max_price \
         FROM watchlist \
         WHERE product_id = ANY($1::text[]) AND is_active \
         ORDER BY product_id, user_id",
    )
    .bind(product_ids)
    .fetch_all(pool)
    .await?;

    let mut by_product: HashMap<String, Vec<Watcher>> = HashMap::new();
    for row in rows {
        by_product.entry(row.product_id).or_default().push(Watcher {
            user_id: row.user_id,
            max_price: row.max_price,
        });
    }
    Ok(by_product)
}

/// Returns linked chat targets grouped by user, one round-trip.
///
/// Users with no linked channel are absent from the map — and therefore
/// never reach the notification queue.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Corrupt`] if
/// a row carries an unknown channel discriminator.
pub async fn get_notification_targets(
    pool: &PgPool,
    user_ids: &[String],
) -> Result<HashMap<String, Vec<NotificationTarget>>, DbError> {
    let rows = sqlx::query_as::<_, TargetRow>(
        "SELECT user_id, channel, channel_target \
         FROM notification_targets \
         WHERE user_id = ANY($1::text[]) \
         ORDER BY user_id, channel",
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await?;

    let mut by_user: HashMap<String, Vec<NotificationTarget>> = HashMap::new();
    for row in rows {
        let channel = Channel::parse(&row.channel)?;
        by_user.entry(row.user_id).or_default().push(NotificationTarget {
            channel,
            channel_target: row.channel_target,
        });
    }
    Ok(by_user)
}
