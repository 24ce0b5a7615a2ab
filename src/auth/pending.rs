//! Short-lived state for in-flight OTP-gated workflows.
//!
//! A pending action holds the hashed OTP (and, for registration, the
//! not-yet-persisted password hash) until the code is verified, abandoned,
//! or expired. Attempt counting lives in its own keyed counter so that a
//! resend can wipe all prior attempt history by overwriting the record.
//! At most one pending action exists per identity per workflow class.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

/// Attempt counters outlive the pending record they guard, so a restart
/// within this horizon still counts against the same budget.
const ATTEMPT_COUNTER_TTL_SECONDS: i64 = 1800;

/// Workflow class namespace; keeps registration and password-reset state
/// for the same identity from clobbering each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingFlow {
    Registration,
    PasswordReset,
}

impl PendingFlow {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "register",
            Self::PasswordReset => "reset_pass",
        }
    }
}

/// One in-flight OTP workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAction {
    pub identity: String,
    pub otp_hash: String,
    /// Workflow-specific data carried to completion (e.g. the pending
    /// password hash during registration).
    pub payload: Option<String>,
    pub max_attempts: i64,
}

/// Result of one attempt increment. Unlike the rate limiter, the attempt
/// that reaches the limit is itself rejected: counts `1..limit-1` are
/// allowed, `count >= limit` is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub allowed: bool,
    pub count: i64,
    pub remaining: i64,
}

impl AttemptOutcome {
    fn from_count(count: i64, limit: i64) -> Self {
        Self {
            allowed: count < limit,
            count,
            remaining: (limit - count).max(0),
        }
    }
}

#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Create or overwrite the pending record for `(flow, identity)` and
    /// reset its attempt counter. Overwriting is the resend semantics: a
    /// new OTP invalidates all prior attempt history.
    async fn create_pending(
        &self,
        flow: PendingFlow,
        identity: &str,
        otp_hash: &str,
        ttl_seconds: i64,
        max_attempts: i64,
        payload: Option<&str>,
    ) -> Result<()>;

    /// Absent when never created, deleted, or expired.
    async fn get_pending(&self, flow: PendingFlow, identity: &str)
        -> Result<Option<PendingAction>>;

    /// Atomically bump the attempt counter. Callers are responsible for
    /// checking `get_pending` first and for discarding the record when the
    /// outcome disallows.
    async fn increment_and_check(
        &self,
        flow: PendingFlow,
        identity: &str,
        limit: i64,
    ) -> Result<AttemptOutcome>;

    /// Remove the record and its attempt counter together. Idempotent.
    async fn delete_pending(&self, flow: PendingFlow, identity: &str) -> Result<()>;
}

/// Postgres-backed store in the same single-statement style as the rate
/// limiter; the record and its counter are separate rows joined by key.
#[derive(Clone, Debug)]
pub struct PgPendingStore {
    pool: PgPool,
}

impl PgPendingStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingStore for PgPendingStore {
    async fn create_pending(
        &self,
        flow: PendingFlow,
        identity: &str,
        otp_hash: &str,
        ttl_seconds: i64,
        max_attempts: i64,
        payload: Option<&str>,
    ) -> Result<()> {
        // Transaction keeps "fresh record" and "zeroed attempts" consistent.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin create_pending transaction")?;

        let query = r"
            INSERT INTO pending_actions
                (flow, identity, otp_hash, payload, max_attempts, expires_at)
            VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 second'))
            ON CONFLICT (flow, identity) DO UPDATE SET
                otp_hash = EXCLUDED.otp_hash,
                payload = EXCLUDED.payload,
                max_attempts = EXCLUDED.max_attempts,
                expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(flow.as_str())
            .bind(identity)
            .bind(otp_hash)
            .bind(payload)
            .bind(max_attempts)
            .bind(ttl_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to upsert pending action")?;

        let query = "DELETE FROM pending_attempts WHERE flow = $1 AND identity = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(flow.as_str())
            .bind(identity)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to reset pending attempts")?;

        tx.commit().await.context("commit create_pending")?;
        Ok(())
    }

    async fn get_pending(
        &self,
        flow: PendingFlow,
        identity: &str,
    ) -> Result<Option<PendingAction>> {
        let query = r"
            SELECT identity, otp_hash, payload, max_attempts
            FROM pending_actions
            WHERE flow = $1
              AND identity = $2
              AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(flow.as_str())
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load pending action")?;

        Ok(row.map(|row| PendingAction {
            identity: row.get("identity"),
            otp_hash: row.get("otp_hash"),
            payload: row.get("payload"),
            max_attempts: row.get("max_attempts"),
        }))
    }

    async fn increment_and_check(
        &self,
        flow: PendingFlow,
        identity: &str,
        limit: i64,
    ) -> Result<AttemptOutcome> {
        let query = r"
            INSERT INTO pending_attempts (flow, identity, count, expires_at)
            VALUES ($1, $2, 1, NOW() + ($3 * INTERVAL '1 second'))
            ON CONFLICT (flow, identity) DO UPDATE SET
                count = CASE
                    WHEN pending_attempts.expires_at <= NOW() THEN 1
                    ELSE pending_attempts.count + 1
                END,
                expires_at = CASE
                    WHEN pending_attempts.expires_at <= NOW()
                        THEN NOW() + ($3 * INTERVAL '1 second')
                    ELSE pending_attempts.expires_at
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
            .bind(flow.as_str())
            .bind(identity)
            .bind(ATTEMPT_COUNTER_TTL_SECONDS)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to increment pending attempts")?;

        Ok(AttemptOutcome::from_count(row.get("count"), limit))
    }

    async fn delete_pending(&self, flow: PendingFlow, identity: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin delete_pending transaction")?;

        for table in ["pending_actions", "pending_attempts"] {
            let query = format!("DELETE FROM {table} WHERE flow = $1 AND identity = $2");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = %query
            );
            sqlx::query(&query)
                .bind(flow.as_str())
                .bind(identity)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .with_context(|| format!("failed to delete from {table}"))?;
        }

        tx.commit().await.context("commit delete_pending")?;
        Ok(())
    }
}

/// In-memory store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, (PendingAction, Instant)>,
    attempts: HashMap<String, (i64, Instant)>,
}

fn record_key(flow: PendingFlow, identity: &str) -> String {
    format!("{}:{identity}", flow.as_str())
}

impl MemoryPendingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn create_pending(
        &self,
        flow: PendingFlow,
        identity: &str,
        otp_hash: &str,
        ttl_seconds: i64,
        max_attempts: i64,
        payload: Option<&str>,
    ) -> Result<()> {
        let key = record_key(flow, identity);
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64);
        let mut state = self.inner.lock().await;
        state.records.insert(
            key.clone(),
            (
                PendingAction {
                    identity: identity.to_string(),
                    otp_hash: otp_hash.to_string(),
                    payload: payload.map(str::to_string),
                    max_attempts,
                },
                expires_at,
            ),
        );
        state.attempts.remove(&key);
        Ok(())
    }

    async fn get_pending(
        &self,
        flow: PendingFlow,
        identity: &str,
    ) -> Result<Option<PendingAction>> {
        let key = record_key(flow, identity);
        let now = Instant::now();
        let state = self.inner.lock().await;
        Ok(state.records.get(&key).and_then(|(record, expires_at)| {
            if *expires_at > now {
                Some(record.clone())
            } else {
                None
            }
        }))
    }

    async fn increment_and_check(
        &self,
        flow: PendingFlow,
        identity: &str,
        limit: i64,
    ) -> Result<AttemptOutcome> {
        let key = record_key(flow, identity);
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        let entry = state.attempts.entry(key).or_insert((0, now));
        let (count, expires_at) = *entry;
        let count = if count == 0 || expires_at <= now {
            *entry = (
                1,
                now + Duration::from_secs(ATTEMPT_COUNTER_TTL_SECONDS as u64),
            );
            1
        } else {
            entry.0 = count + 1;
            count + 1
        };
        Ok(AttemptOutcome::from_count(count, limit))
    }

    async fn delete_pending(&self, flow: PendingFlow, identity: &str) -> Result<()> {
        let key = record_key(flow, identity);
        let mut state = self.inner.lock().await;
        state.records.remove(&key);
        state.attempts.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_at_the_limit_is_rejected() {
        assert!(AttemptOutcome::from_count(1, 3).allowed);
        assert!(AttemptOutcome::from_count(2, 3).allowed);
        assert!(!AttemptOutcome::from_count(3, 3).allowed);
        assert!(!AttemptOutcome::from_count(4, 3).allowed);
    }

    #[tokio::test]
    async fn lifecycle_create_get_delete() -> Result<()> {
        let store = MemoryPendingStore::new();
        store
            .create_pending(
                PendingFlow::Registration,
                "a@example.com",
                "otp-hash",
                600,
                3,
                Some("pw-hash"),
            )
            .await?;

        let record = store
            .get_pending(PendingFlow::Registration, "a@example.com")
            .await?
            .expect("pending record");
        assert_eq!(record.otp_hash, "otp-hash");
        assert_eq!(record.payload.as_deref(), Some("pw-hash"));
        assert_eq!(record.max_attempts, 3);

        store
            .delete_pending(PendingFlow::Registration, "a@example.com")
            .await?;
        assert!(store
            .get_pending(PendingFlow::Registration, "a@example.com")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn flows_are_namespaced() -> Result<()> {
        let store = MemoryPendingStore::new();
        store
            .create_pending(
                PendingFlow::Registration,
                "a@example.com",
                "reg-otp",
                600,
                3,
                None,
            )
            .await?;
        store
            .create_pending(
                PendingFlow::PasswordReset,
                "a@example.com",
                "reset-otp",
                600,
                3,
                None,
            )
            .await?;

        let reg = store
            .get_pending(PendingFlow::Registration, "a@example.com")
            .await?
            .expect("registration record");
        assert_eq!(reg.otp_hash, "reg-otp");

        store
            .delete_pending(PendingFlow::PasswordReset, "a@example.com")
            .await?;
        assert!(store
            .get_pending(PendingFlow::Registration, "a@example.com")
            .await?
            .is_some());
        Ok(())
    }

    #[tokio::test]
    async fn three_attempts_with_limit_three() -> Result<()> {
        let store = MemoryPendingStore::new();
        store
            .create_pending(
                PendingFlow::Registration,
                "a@example.com",
                "otp-hash",
                600,
                3,
                None,
            )
            .await?;

        let first = store
            .increment_and_check(PendingFlow::Registration, "a@example.com", 3)
            .await?;
        assert!(first.allowed);
        assert_eq!(first.remaining, 2);

        let second = store
            .increment_and_check(PendingFlow::Registration, "a@example.com", 3)
            .await?;
        assert!(second.allowed);
        assert_eq!(second.remaining, 1);

        let third = store
            .increment_and_check(PendingFlow::Registration, "a@example.com", 3)
            .await?;
        assert!(!third.allowed);
        assert_eq!(third.count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn overwrite_resets_attempts() -> Result<()> {
        let store = MemoryPendingStore::new();
        store
            .create_pending(
                PendingFlow::Registration,
                "a@example.com",
                "first-otp",
                600,
                3,
                None,
            )
            .await?;
        store
            .increment_and_check(PendingFlow::Registration, "a@example.com", 3)
            .await?;
        store
            .increment_and_check(PendingFlow::Registration, "a@example.com", 3)
            .await?;

        // Resend: fresh OTP, fresh budget.
        store
            .create_pending(
                PendingFlow::Registration,
                "a@example.com",
                "second-otp",
                600,
                3,
                None,
            )
            .await?;
        let outcome = store
            .increment_and_check(PendingFlow::Registration, "a@example.com", 3)
            .await?;
        assert!(outcome.allowed);
        assert_eq!(outcome.count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn expired_record_reads_as_absent() -> Result<()> {
        let store = MemoryPendingStore::new();
        store
            .create_pending(
                PendingFlow::Registration,
                "a@example.com",
                "otp-hash",
                0,
                3,
                None,
            )
            .await?;
        assert!(store
            .get_pending(PendingFlow::Registration, "a@example.com")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn counter_exists_independently_of_record() -> Result<()> {
        // The store does not validate record presence; that is the caller's
        // contract via get_pending.
        let store = MemoryPendingStore::new();
        let outcome = store
            .increment_and_check(PendingFlow::Registration, "ghost@example.com", 3)
            .await?;
        assert!(outcome.allowed);
        assert_eq!(outcome.count, 1);
        Ok(())
    }
}
