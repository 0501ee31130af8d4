use cardwatch_core::AppConfig;
use sqlx::migrate::Migrate;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

// Path relative to crates/cardwatch-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("link token is invalid, expired, or already consumed")]
    LinkTokenRejected,
    #[error("invalid {column} value in row: {reason}")]
    Corrupt { column: &'static str, reason: String },
    #[error(transparent)]
    Config(#[from] cardwatch_core::ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let applied_before = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations().await?.len()
    };

    MIGRATOR.run(pool).await?;

    let applied_after = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations().await?.len()
    };

    Ok(applied_after.saturating_sub(applied_before))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}


pub mod link_tokens;
pub mod notifications;
pub mod products;
pub mod results;
pub mod state;
pub mod watchlist;

pub use link_tokens::{consume_link_token, delete_expired_link_tokens, mint_link_token};
pub use notifications::{
    delete_expired_notifications, insert_notification_audit, DeliveryRecord, NewNotification,
};
pub use products::{load_product_catalog, ProductCatalog};
pub use results::{
    best_offer_for_product, best_offers_for_products, delete_expired_results, upsert_result,
    BestOfferRow,
};
pub use state::{
    load_notification_states, upsert_notification_states, NotificationStateRow, StateUpsert,
};
pub use watchlist::{
    get_active_watchers_by_product_ids, get_notification_targets, Channel, NotificationTarget,
    Watcher,
};
