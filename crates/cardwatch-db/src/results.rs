//! Database operations for the `product_results` hourly store.
//!
//! The store is the sole writer of observations. Uniqueness is
//! `(product_id, shop_id, hour_bucket)` — a later observation within the
//! same UTC hour overwrites the earlier one in place.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use cardwatch_core::ProductResult;

use crate::DbError;

/// The cheapest currently-buyable offer for a product.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BestOfferRow {
    pub product_id: String,
    pub shop_id: String,
    pub product_url: String,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Upserts one observation into its `(product_id, shop_id, hour_bucket)` slot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_result(pool: &PgPool, result: &ProductResult) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO product_results \
             (product_id, shop_id, hour_bucket, product_url, price, is_available, observed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (product_id, shop_id, hour_bucket) DO UPDATE SET \
             product_url  = EXCLUDED.product_url, \
             price        = EXCLUDED.price, \
             is_available = EXCLUDED.is_available, \
             observed_at  = EXCLUDED.observed_at",
    )
    .bind(&result.product_id)
    .bind(&result.shop_id)
    .bind(result.hour_bucket())
    .bind(&result.product_url)
    .bind(result.price)
    .bind(result.is_available)
    .bind(result.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns the minimum-price available offer for a product within the given
/// hour bucket, tie-broken by most recent observation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn best_offer_for_product(
    pool: &PgPool,
    product_id: &str,
    hour_bucket: &str,
) -> Result<Option<BestOfferRow>, DbError> {
    let row = sqlx::query_as::<_, BestOfferRow>(
        "SELECT product_id, shop_id, product_url, price, observed_at \
         FROM product_results \
         WHERE product_id = $1 \
           AND hour_bucket = $2 \
           AND is_available \
           AND price IS NOT NULL \
         ORDER BY price ASC, observed_at DESC \
         LIMIT 1",
    )
    .bind(product_id)
    .bind(hour_bucket)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Batch form of [`best_offer_for_product`]: one round-trip for many products.
///
/// Products with no current available, priced offer are absent from the
/// returned list.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn best_offers_for_products(
    pool: &PgPool,
    product_ids: &[String],
    hour_bucket: &str,
) -> Result<Vec<BestOfferRow>, DbError> {
    let rows = sqlx::query_as::<_, BestOfferRow>(
        "SELECT DISTINCT ON (product_id) \
             product_id, shop_id, product_url, price, observed_at \
         FROM product_results \
         WHERE product_id = ANY($1::text[]) \
           AND hour_bucket = $2 \
           AND is_available \
           AND price IS NOT NULL \
         ORDER BY product_id, price ASC, observed_at DESC",
    )
    .bind(product_ids)
    .bind(hour_bucket)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Removes observations older than `ttl_hours`. Emulates a TTL index with a
/// periodic sweep.
///
/// Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_expired_results(pool: &PgPool, ttl_hours: i32) -> Result<u64, DbError> {
    let deleted = sqlx::query(
        "DELETE FROM product_results \
         WHERE created_at < NOW() - make_interval(hours => $1)",
    )
    .bind(ttl_hours)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(deleted)
}
