//! End-to-end workflow tests over the public crate API, using the in-memory
//! stores and a fixture RSA keypair.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use entrata::auth::hasher::Argon2Hasher;
use entrata::auth::pending::MemoryPendingStore;
use entrata::auth::rate_limit::MemoryRateLimitStore;
use entrata::auth::session::MemoryRefreshSessionStore;
use entrata::auth::tokens::{SigningKeys, TokenIssuer};
use entrata::auth::{AuthConfig, AuthError, Authenticator};
use entrata::email::{CodePurpose, CodeSender};
use entrata::flows::{Flows, RESET_SCOPE};
use entrata::users::{MemoryUserRepository, UserRepository};

const TEST_PRIVATE_PEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/jwt_test_private.pem"
));
const TEST_PUBLIC_PEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/jwt_test_public.pem"
));

#[derive(Default)]
struct CapturingSender {
    sent: Mutex<Vec<(String, String, CodePurpose)>>,
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
    async fn wait_for_code(&self, index: usize) -> String {
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

fn build(config: AuthConfig) -> (Flows, Arc<CapturingSender>, Arc<MemoryUserRepository>) {
    let keys = SigningKeys::from_pem(TEST_PRIVATE_PEM, TEST_PUBLIC_PEM, "test-key").expect("keys");
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
    let users = Arc::new(MemoryUserRepository::new());
    let sender = Arc::new(CapturingSender::default());
    let flows = Flows::new(
        users.clone(),
        Arc::new(Argon2Hasher),
        Arc::new(MemoryRateLimitStore::new()),
        Arc::new(MemoryPendingStore::new()),
        authenticator,
        sender.clone(),
        config,
    );
    (flows, sender, users)
}

fn config() -> AuthConfig {
    AuthConfig::new("https://auth.example.test".to_string()).with_resend_cooldown_seconds(0)
}

#[tokio::test]
async fn register_verify_then_login() {
    let (flows, sender, users) = build(config());

    flows
        .register_start("Ada@Example.com", "correct horse battery")
        .await
        .expect("start");
    let code = sender.wait_for_code(0).await;

    let pair = flows
        .register_finish("ada@example.com", &code)
        .await
        .expect("finish");
    assert!(!pair.access_token.is_empty());

    let stored = users
        .get_by_email("ada@example.com")
        .await
        .expect("lookup")
        .expect("user exists");
    assert_eq!(stored.email, "ada@example.com");
    // The stored hash is argon2, never the plain password.
    assert!(stored.password_hash.starts_with("$argon2"));

    let login_pair = flows
        .login("ada@example.com", "correct horse battery")
        .await
        .expect("login");
    let claims = flows
        .authenticator()
        .issuer()
        .verify_access_token(&login_pair.access_token)
        .expect("valid access token");
    assert_eq!(claims.sub, stored.id.to_string());
}

#[tokio::test]
async fn refresh_rotation_and_reuse_revocation() {
    let (flows, sender, _users) = build(config());

    flows
        .register_start("bob@example.com", "hunter2hunter2")
        .await
        .expect("start");
    let code = sender.wait_for_code(0).await;
    let first = flows
        .register_finish("bob@example.com", &code)
        .await
        .expect("finish");

    // Normal rotation replaces the active session token.
    let second = flows
        .authenticator()
        .rotate(&first.refresh_token)
        .await
        .expect("rotate");
    assert_ne!(first.refresh_token, second.refresh_token);

    // Replaying the consumed token is reuse, and reuse revokes the session.
    let reuse = flows.authenticator().rotate(&first.refresh_token).await;
    assert!(matches!(reuse, Err(AuthError::TokenReuseDetected)));

    // The revocation killed the live token too.
    let after = flows.authenticator().rotate(&second.refresh_token).await;
    assert!(matches!(after, Err(AuthError::TokenReuseDetected)));

    // A fresh login starts a new session.
    let relogin = flows
        .login("bob@example.com", "hunter2hunter2")
        .await
        .expect("login");
    flows
        .authenticator()
        .rotate(&relogin.refresh_token)
        .await
        .expect("rotation after re-login");
}

#[tokio::test]
async fn password_reset_full_cycle() {
    let (flows, sender, _users) = build(config());

    flows
        .register_start("carol@example.com", "original password")
        .await
        .expect("start");
    let code = sender.wait_for_code(0).await;
    flows
        .register_finish("carol@example.com", &code)
        .await
        .expect("finish");

    flows
        .reset_start("carol@example.com")
        .await
        .expect("reset start");
    let reset_code = sender.wait_for_code(1).await;

    let reset_token = flows
        .reset_verify("carol@example.com", &reset_code)
        .await
        .expect("reset verify");
    let claims = flows
        .authenticator()
        .issuer()
        .verify_access_token(&reset_token)
        .expect("reset token verifies");
    assert_eq!(
        claims.extra.get("scope").and_then(|v| v.as_str()),
        Some(RESET_SCOPE)
    );
    let user_id: Uuid = claims.sub.parse().expect("sub is a uuid");

    let pair = flows
        .reset_finish(user_id, "replacement password")
        .await
        .expect("reset finish");
    assert!(!pair.refresh_token.is_empty());

    // Old credential is dead, new one works.
    let old = flows.login("carol@example.com", "original password").await;
    assert!(matches!(old, Err(AuthError::InvalidCredentials)));
    flows
        .login("carol@example.com", "replacement password")
        .await
        .expect("login with new password");
}

#[tokio::test]
async fn login_rate_limit_window() {
    let (flows, _sender, _users) = build(config().with_login_limit(3, 900));

    for _ in 0..3 {
        let attempt = flows.login("nobody@example.com", "whatever").await;
        assert!(matches!(attempt, Err(AuthError::InvalidCredentials)));
    }
    let limited = flows.login("nobody@example.com", "whatever").await;
    assert!(matches!(
        limited,
        Err(AuthError::RateLimited { window_seconds: 900 })
    ));
}

#[tokio::test]
async fn registration_attempts_exhaust_and_invalidate() {
    let (flows, sender, _users) = build(config().with_otp_max_attempts(3));

    flows
        .register_start("dave@example.com", "some password")
        .await
        .expect("start");
    let code = sender.wait_for_code(0).await;
    let wrong = if code == "111111" { "222222" } else { "111111" };

    let first = flows.register_finish("dave@example.com", wrong).await;
    assert!(matches!(
        first,
        Err(AuthError::CodeMismatch {
            remaining_attempts: 2
        })
    ));
    let second = flows.register_finish("dave@example.com", wrong).await;
    assert!(matches!(
        second,
        Err(AuthError::CodeMismatch {
            remaining_attempts: 1
        })
    ));

    // The attempt that reaches the limit is itself rejected and the
    // pending record is discarded, correct code or not.
    let third = flows.register_finish("dave@example.com", &code).await;
    assert!(matches!(third, Err(AuthError::AttemptsExhausted)));
    let fourth = flows.register_finish("dave@example.com", &code).await;
    assert!(matches!(fourth, Err(AuthError::PendingExpiredOrMissing)));
}
