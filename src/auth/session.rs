//! Whitelist of the single currently-valid refresh token per user.
//!
//! `save` unconditionally supersedes whatever session existed: that IS the
//! rotation mechanism. `consume_by_token_id` is an atomic read-and-delete,
//! so a given token id can be consumed at most once; a miss is the reuse
//! detection signal. Both lookup directions (user → jti for revocation,
//! jti → user for rotation) are O(1).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

#[async_trait]
pub trait RefreshSessionStore: Send + Sync {
    /// Set the active session for `user_id` to `token_id`, overwriting any
    /// previous session. Last writer wins.
    async fn save(&self, user_id: Uuid, token_id: &str, ttl_seconds: i64) -> Result<()>;

    /// Atomically look up and delete the session owning `token_id`.
    /// Returns the owning user when the token was the live session; absent
    /// when it was never valid, already consumed, expired, or superseded.
    async fn consume_by_token_id(&self, token_id: &str) -> Result<Option<Uuid>>;

    /// Delete the user's active session. No-op when none exists.
    async fn revoke_by_user_id(&self, user_id: Uuid) -> Result<()>;
}

/// Postgres-backed store. One row per user (`user_id` is the primary key)
/// with a unique index on `token_id` gives both lookup directions; the
/// consume is a single `DELETE .. RETURNING`, so racing rotations resolve
/// to exactly one winner.
#[derive(Clone, Debug)]
pub struct PgRefreshSessionStore {
    pool: PgPool,
}

impl PgRefreshSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshSessionStore for PgRefreshSessionStore {
    async fn save(&self, user_id: Uuid, token_id: &str, ttl_seconds: i64) -> Result<()> {
        let query = r"
            INSERT INTO refresh_sessions (user_id, token_id, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            ON CONFLICT (user_id) DO UPDATE SET
                token_id = EXCLUDED.token_id,
                expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(token_id)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save refresh session")?;
        Ok(())
    }

    async fn consume_by_token_id(&self, token_id: &str) -> Result<Option<Uuid>> {
        let query = r"
            DELETE FROM refresh_sessions
            WHERE token_id = $1
              AND expires_at > NOW()
            RETURNING user_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume refresh session")?;
        Ok(row.map(|row| row.get("user_id")))
    }

    async fn revoke_by_user_id(&self, user_id: Uuid) -> Result<()> {
        let query = "DELETE FROM refresh_sessions WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh session")?;
        Ok(())
    }
}

/// In-memory store for tests and local development. Both indexes mutate
/// under one mutex, so consume is atomic and the indexes never diverge.
#[derive(Debug, Default)]
pub struct MemoryRefreshSessionStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    by_user: HashMap<Uuid, (String, Instant)>,
    by_token: HashMap<String, Uuid>,
}

impl MemoryRefreshSessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshSessionStore for MemoryRefreshSessionStore {
    async fn save(&self, user_id: Uuid, token_id: &str, ttl_seconds: i64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64);
        let mut state = self.inner.lock().await;
        if let Some((old_token, _)) = state
            .by_user
            .insert(user_id, (token_id.to_string(), expires_at))
        {
            state.by_token.remove(&old_token);
        }
        state.by_token.insert(token_id.to_string(), user_id);
        Ok(())
    }

    async fn consume_by_token_id(&self, token_id: &str) -> Result<Option<Uuid>> {
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        let Some(user_id) = state.by_token.remove(token_id) else {
            return Ok(None);
        };
        let Some((_, expires_at)) = state.by_user.remove(&user_id) else {
            return Ok(None);
        };
        if expires_at <= now {
            return Ok(None);
        }
        Ok(Some(user_id))
    }

    async fn revoke_by_user_id(&self, user_id: Uuid) -> Result<()> {
        let mut state = self.inner.lock().await;
        if let Some((token_id, _)) = state.by_user.remove(&user_id) {
            state.by_token.remove(&token_id);
        }
        Ok(())
    }
}
