//! Fixed-window rate limiting and single-flight email cooldowns.
//!
//! Counters are keyed by `(action prefix, identity)` and live for one
//! window; cooldowns are keyed by identity alone and enforce "at most one
//! code dispatch per cooldown period". Both primitives must be atomic from
//! the store's perspective: concurrent callers for the same key observe
//! strictly serialized increments, and exactly one concurrent caller wins
//! the cooldown slot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

/// Result of one fixed-window increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub count: i64,
    pub remaining: i64,
}

impl RateLimitOutcome {
    fn from_count(count: i64, limit: i64) -> Self {
        Self {
            allowed: count <= limit,
            count,
            remaining: (limit - count).max(0),
        }
    }
}

/// Result of a cooldown acquisition attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CooldownOutcome {
    /// The caller owns the cooldown slot and may dispatch a code.
    Created,
    /// A cooldown is alive; retry after `seconds_left`.
    Active { seconds_left: i64 },
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increment the `(prefix, identity)` counter. The first
    /// increment in a fresh or expired window resets the window expiry.
    async fn increment_and_check(
        &self,
        identity: &str,
        prefix: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<RateLimitOutcome>;

    /// Atomically create the per-identity cooldown marker only if absent.
    async fn check_and_set_cooldown(
        &self,
        identity: &str,
        cooldown_seconds: i64,
    ) -> Result<CooldownOutcome>;
}

fn counter_key(prefix: &str, identity: &str) -> String {
    format!("{prefix}:{identity}")
}

/// Postgres-backed store. Every mutation is a single statement, so the
/// database serializes concurrent callers per row; there is no
/// read-modify-write window.
#[derive(Clone, Debug)]
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn increment_and_check(
        &self,
        identity: &str,
        prefix: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<RateLimitOutcome> {
        // The CASE folds the window-reset transition into the same upsert:
        // an expired row behaves exactly like a missing one.
        let query = r"
            INSERT INTO rate_limit_counters (key, count, window_expires_at)
            VALUES ($1, 1, NOW() + ($2 * INTERVAL '1 second'))
            ON CONFLICT (key) DO UPDATE SET
                count = CASE
                    WHEN rate_limit_counters.window_expires_at <= NOW() THEN 1
                    ELSE rate_limit_counters.count + 1
                END,
                window_expires_at = CASE
                    WHEN rate_limit_counters.window_expires_at <= NOW()
                        THEN NOW() + ($2 * INTERVAL '1 second')
                    ELSE rate_limit_counters.window_expires_at
                END
            RETURNING count
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(counter_key(prefix, identity))
            .bind(window_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to increment rate limit counter")?;

        Ok(RateLimitOutcome::from_count(row.get("count"), limit))
    }

    async fn check_and_set_cooldown(
        &self,
        identity: &str,
        cooldown_seconds: i64,
    ) -> Result<CooldownOutcome> {
        // Conditional upsert: the row is (re)claimed only when no live
        // cooldown exists, so exactly one concurrent caller sees a write.
        let query = r"
            INSERT INTO email_cooldowns (identity, expires_at)
            VALUES ($1, NOW() + ($2 * INTERVAL '1 second'))
            ON CONFLICT (identity) DO UPDATE SET
                expires_at = EXCLUDED.expires_at
            WHERE email_cooldowns.expires_at <= NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(identity)
            .bind(cooldown_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to set email cooldown")?;

        if result.rows_affected() == 1 {
            return Ok(CooldownOutcome::Created);
        }

        let query = r"
            SELECT CEIL(EXTRACT(EPOCH FROM (expires_at - NOW())))::BIGINT AS seconds_left
            FROM email_cooldowns
            WHERE identity = $1
              AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to read cooldown remainder")?;

        // The marker can expire between the two statements; report zero
        // rather than claiming a slot the caller does not hold.
        let seconds_left = row.map_or(0, |row| row.get::<i64, _>("seconds_left").max(0));
        Ok(CooldownOutcome::Active { seconds_left })
    }
}

/// In-memory store for tests and local development. A single mutex over
/// the keyed maps provides the same serialization the database gives the
/// Postgres impl.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    counters: HashMap<String, (i64, Instant)>,
    cooldowns: HashMap<String, Instant>,
}

impl MemoryRateLimitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment_and_check(
        &self,
        identity: &str,
        prefix: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<RateLimitOutcome> {
        let key = counter_key(prefix, identity);
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        let entry = state.counters.entry(key).or_insert((0, now));
        let (count, expires_at) = *entry;
        let count = if count == 0 || expires_at <= now {
            *entry = (1, now + Duration::from_secs(window_seconds.max(0) as u64));
            1
        } else {
            entry.0 = count + 1;
            count + 1
        };
        Ok(RateLimitOutcome::from_count(count, limit))
    }

    async fn check_and_set_cooldown(
        &self,
        identity: &str,
        cooldown_seconds: i64,
    ) -> Result<CooldownOutcome> {
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        if let Some(expires_at) = state.cooldowns.get(identity).copied() {
            if expires_at > now {
                let left = expires_at - now;
                let mut seconds_left = left.as_secs() as i64;
                if left.subsec_nanos() > 0 {
                    seconds_left += 1; // round up, matching the Pg CEIL
                }
                return Ok(CooldownOutcome::Active { seconds_left });
            }
        }
        state.cooldowns.insert(
            identity.to_string(),
            now + Duration::from_secs(cooldown_seconds.max(0) as u64),
        );
        Ok(CooldownOutcome::Created)
    }
}
