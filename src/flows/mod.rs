//! Authentication workflows: registration, login, password reset.
//!
//! A [`Flows`] value owns the collaborator seams (user repository, hasher,
//! rate-limit store, pending store, orchestrator, code sender) and exposes
//! one method per user-facing operation. Methods return [`AuthError`]
//! kinds; the HTTP layer maps those to status codes.

mod login;
mod password_reset;
mod registration;

pub use password_reset::RESET_SCOPE;

use anyhow::Context;
use rand::Rng;
use std::sync::Arc;

use crate::auth::hasher::SecretHasher;
use crate::auth::pending::PendingStore;
use crate::auth::rate_limit::{CooldownOutcome, RateLimitStore};
use crate::auth::{AuthConfig, AuthError, Authenticator};
use crate::email::CodeSender;
use crate::users::UserRepository;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Six decimal digits, uniformly distributed, never with a leading zero.
fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub struct Flows {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn SecretHasher>,
    rate_limits: Arc<dyn RateLimitStore>,
    pending: Arc<dyn PendingStore>,
    authenticator: Arc<Authenticator>,
    sender: Arc<dyn CodeSender>,
    config: AuthConfig,
}

impl Flows {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn SecretHasher>,
        rate_limits: Arc<dyn RateLimitStore>,
        pending: Arc<dyn PendingStore>,
        authenticator: Arc<Authenticator>,
        sender: Arc<dyn CodeSender>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            hasher,
            rate_limits,
            pending,
            authenticator,
            sender,
            config,
        }
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Argon2 is CPU-bound; keep it off the async workers.
    pub(crate) async fn hash_secret(&self, plain: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("hashing task panicked")??;
        Ok(hash)
    }

    pub(crate) async fn verify_secret(
        &self,
        plain: String,
        hashed: String,
    ) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let matched = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hashed))
            .await
            .context("verification task panicked")??;
        Ok(matched)
    }

    /// Fixed-window gate shared by all three workflows.
    pub(crate) async fn enforce_rate_limit(
        &self,
        identity: &str,
        prefix: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<(), AuthError> {
        let outcome = self
            .rate_limits
            .increment_and_check(identity, prefix, limit, window_seconds)
            .await?;
        if outcome.allowed {
            Ok(())
        } else {
            Err(AuthError::RateLimited { window_seconds })
        }
    }

    /// Single-flight code dispatch gate.
    pub(crate) async fn enforce_cooldown(&self, identity: &str) -> Result<(), AuthError> {
        match self
            .rate_limits
            .check_and_set_cooldown(identity, self.config.resend_cooldown_seconds())
            .await?
        {
            CooldownOutcome::Created => Ok(()),
            CooldownOutcome::Active { seconds_left } => {
                Err(AuthError::CooldownActive { seconds_left })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use crate::auth::hasher::Argon2Hasher;
    use crate::auth::pending::MemoryPendingStore;
    use crate::auth::rate_limit::MemoryRateLimitStore;
    use crate::auth::session::MemoryRefreshSessionStore;
    use crate::auth::tokens::{SigningKeys, TokenIssuer};
    use crate::email::CodePurpose;
    use crate::users::MemoryUserRepository;
    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    const TEST_PRIVATE_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/jwt_test_private.pem"
    ));
    const TEST_PUBLIC_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/jwt_test_public.pem"
    ));

    /// Test sender that records every dispatched code.
    #[derive(Default)]
    pub(crate) struct CapturingSender {
        pub(crate) sent: Mutex<Vec<(String, String, CodePurpose)>>,
    }

    #[async_trait]
    impl CodeSender for CapturingSender {
        async fn send_code(&self, email: &str, code: &str, purpose: CodePurpose) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((email.to_string(), code.to_string(), purpose));
            Ok(())
        }
    }

    impl CapturingSender {
        /// Delivery runs on a spawned task; yield until the nth code lands.
        pub(crate) async fn wait_for_code(&self, index: usize) -> String {
            for _ in 0..1000 {
                {
                    let sent = self.sent.lock().await;
                    if sent.len() > index {
                        return sent[index].1.clone();
                    }
                }
                tokio::task::yield_now().await;
            }
            panic!("code {index} was never dispatched");
        }
    }

    pub(crate) fn flows(config: AuthConfig) -> (Flows, Arc<CapturingSender>) {
        let keys =
            SigningKeys::from_pem(TEST_PRIVATE_PEM, TEST_PUBLIC_PEM, "test-key").expect("keys");
        let issuer = TokenIssuer::new(
            keys,
            config.issuer().to_string(),
            config.access_ttl_seconds(),
            config.refresh_ttl_seconds(),
        );
        let authenticator = Arc::new(Authenticator::new(
            issuer,
            Arc::new(MemoryRefreshSessionStore::new()),
        ));
        let sender = Arc::new(CapturingSender::default());
        let flows = Flows::new(
            Arc::new(MemoryUserRepository::new()),
            Arc::new(Argon2Hasher),
            Arc::new(MemoryRateLimitStore::new()),
            Arc::new(MemoryPendingStore::new()),
            authenticator,
            sender.clone(),
            config,
        );
        (flows, sender)
    }

    pub(crate) fn default_config() -> AuthConfig {
        AuthConfig::new("https://auth.entrata.dev".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{generate_otp, normalize_email};

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }
}
