//! One-time tokens that bind a chat channel to a user.
//!
//! The web service mints a token and shows it to the user; the user pastes
//! it to the chat bot, whose frontend consumes it here. Tokens are stored as
//! SHA-256 digests and compared in constant time; the plaintext exists only
//! in the mint response.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::watchlist::Channel;
use crate::DbError;

fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        // Writing to a String cannot fail.
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Mints a fresh link token for `(user_id, channel)` and returns the
/// plaintext exactly once.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn mint_link_token(
    pool: &PgPool,
    user_id: &str,
    channel: Channel,
    ttl_minutes: i64,
    now: DateTime<Utc>,
) -> Result<String, DbError> {
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = now + chrono::Duration::minutes(ttl_minutes);

    sqlx::query(
        "INSERT INTO link_tokens (user_id, channel, token_hash, expires_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(channel.as_str())
    .bind(hash_token(&token))
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(token)
}

#[derive(Debug, sqlx::FromRow)]
struct PendingTokenRow {
    id: i64,
    user_id: String,
    channel: String,
    token_hash: String,
}

/// Consumes a link token, binding `channel_target` to the minting user.
///
/// Returns the user the channel was linked for. The token is compared in
/// constant time against every live candidate and can be consumed at most
/// once.
///
/// # Errors
///
/// Returns [`DbError::LinkTokenRejected`] for unknown, expired, or already
/// consumed tokens, and [`DbError::Sqlx`] on query failure.
pub async fn consume_link_token(
    pool: &PgPool,
    token: &str,
    channel_target: &str,
) -> Result<String, DbError> {
    let presented_hash = hash_token(token);

    let candidates = sqlx::query_as::<_, PendingTokenRow>(
        "SELECT id, user_id, channel, token_hash \
         FROM link_tokens \
         WHERE consumed_at IS NULL AND expires_at > NOW()",
    )
    .fetch_all(pool)
    .await?;

    // Scan every live token so timing does not leak which hash matched.
    let mut matched: Option<&PendingTokenRow> = None;
    for candidate in &candidates {
        if candidate
            .token_hash
            .as_bytes()
            .ct_eq(presented_hash.as_bytes())
            .into()
        {
            matched = Some(candidate);
        }
    }
    let Some(row) = matched else {
        return Err(DbError::LinkTokenRejected);
    };
    let channel = Channel::parse(&row.channel)?;

    let mut tx = pool.begin().await?;
    let consumed = sqlx::query(
        "UPDATE link_tokens SET consumed_at = NOW() \
         WHERE id = $1 AND consumed_at IS NULL",
    )
    .bind(row.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if consumed == 0 {
        // Raced with a concurrent consumption of the same token.
        return Err(DbError::LinkTokenRejected);
    }

    sqlx::query(
        "INSERT INTO notification_targets (user_id, channel, channel_target) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (user_id, channel) DO UPDATE SET \
             channel_target = EXCLUDED.channel_target",
    )
    .bind(&row.user_id)
    .bind(channel.as_str())
    .bind(channel_target)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user = %row.user_id, channel = %channel, "linked notification channel");
    Ok(row.user_id.clone())
}

/// Removes expired and consumed tokens.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_expired_link_tokens(pool: &PgPool) -> Result<u64, DbError> {
    let deleted = sqlx::query(
        "DELETE FROM link_tokens \
         WHERE expires_at <= NOW() OR consumed_at IS NOT NULL",
    )
    .execute(pool)
    .await?
    .rows_affected();

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_token_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash_token_differs_per_token() {
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }
}
