//! Persistence for per-(user, product, shop) notification state.
//!
//! The dispatcher owns the in-memory view during a cycle; this module only
//! preloads it at cycle start and flushes the dirty entries in one batch at
//! cycle end.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `notification_state` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct NotificationStateRow {
    pub user_id: String,
    pub product_id: String,
    pub shop_id: String,
    pub last_notified: Option<DateTime<Utc>>,
    pub last_price: Option<Decimal>,
    pub was_available: bool,
}

/// One dirty state entry to persist at cycle end.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpsert {
    pub user_id: String,
    pub product_id: String,
    pub shop_id: String,
    pub last_notified: Option<DateTime<Utc>>,
    pub last_price: Option<Decimal>,
    pub was_available: bool,
}

/// Loads all persisted state for the given products, one round-trip.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_notification_states(
    pool: &PgPool,
    product_ids: &[String],
) -> Result<Vec<NotificationStateRow>, DbError> {
    let rows = sqlx::query_as::<_, NotificationStateRow>(
        "SELECT user_id, product_id, shop_id, last_notified, last_price, was_available \
         FROM notification_state \
         WHERE product_id = ANY($1::text[])",
    )
    .bind(product_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Writes a batch of state entries in one transaction.
///
/// The whole batch commits or none of it does: a partially-persisted cycle
/// would silently suppress retries for the lost entries.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any upsert or the commit fails.
pub async fn upsert_notification_states(
    pool: &PgPool,
    entries: &[StateUpsert],
) -> Result<(), DbError> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            "INSERT INTO notification_state \
                 (user_id, product_id, shop_id, last_notified, last_price, was_available, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (user_id, product_id, shop_id) DO UPDATE SET \
                 last_notified = EXCLUDED.last_notified, \
                 last_price    = EXCLUDED.last_price, \
                 was_available = EXCLUDED.was_available, \
                 updated_at    = NOW()",
        )
        .bind(&entry.user_id)
        .bind(&entry.product_id)
        .bind(&entry.shop_id)
        .bind(entry.last_notified)
        .bind(entry.last_price)
        .bind(entry.was_available)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(())
}
