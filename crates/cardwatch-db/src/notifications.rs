//! Append-only notification audit records.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;

use crate::watchlist::Channel;
use crate::DbError;

/// Outcome of one delivery attempt to one channel target.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub channel: Channel,
    pub channel_target: String,
    /// `"sent"` or `"failed"`.
    pub status: &'static str,
    pub attempts: u32,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// One audit row: the rendered payload plus its delivery outcomes.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    /// Overall status: `"sent"` when every delivery succeeded, else `"failed"`.
    pub status: &'static str,
    pub payload: serde_json::Value,
    pub deliveries: Vec<DeliveryRecord>,
}

/// Inserts one audit record. Rows are never updated; retries produce fresh
/// rows on later cycles.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_notification_audit(
    pool: &PgPool,
    notification: &NewNotification,
) -> Result<(), DbError> {
    let deliveries: Vec<serde_json::Value> = notification
        .deliveries
        .iter()
        .map(|delivery| {
            json!({
                "channel": delivery.channel.as_str(),
                "channelTarget": delivery.channel_target,
                "status": delivery.status,
                "attempts": delivery.attempts,
                "error": delivery.error,
                "sentAt": delivery.sent_at,
            })
        })
        .collect();

    sqlx::query(
        "INSERT INTO notifications (user_id, status, payload, deliveries) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&notification.user_id)
    .bind(notification.status)
    .bind(&notification.payload)
    .bind(serde_json::Value::Array(deliveries))
    .execute(pool)
    .await?;

    Ok(())
}

/// Removes audit rows older than `ttl_days`.
///
/// Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_expired_notifications(pool: &PgPool, ttl_days: i32) -> Result<u64, DbError> {
    let deleted = sqlx::query(
        "DELETE FROM notifications \
         WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(ttl_days)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(deleted)
}
