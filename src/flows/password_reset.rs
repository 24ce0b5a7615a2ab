//! Password reset: start, resend, verify, finish.
//!
//! Verify does not change the password by itself; it issues a short-lived
//! access token scoped to the reset, and finish consumes that
//! authorization to set the new hash. Finish also rotates the session, so
//! any refresh token issued before the reset stops working.

use tracing::info;
use uuid::Uuid;

use super::{generate_otp, normalize_email, Flows};
use crate::auth::pending::PendingFlow;
use crate::auth::{AuthError, TokenPair};
use crate::email::{dispatch_code, CodePurpose};

const RESET_PREFIX: &str = "reset_pass";

/// Claim marking an access token as reset-scoped.
pub const RESET_SCOPE: &str = "reset_password";

impl Flows {
    /// Begin a reset for an existing account. Reports `IdentityNotFound`
    /// accurately; hiding that from clients is the HTTP layer's call.
    pub async fn reset_start(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        let (limit, window_seconds) = self.config().reset_limit();
        self.enforce_rate_limit(&email, RESET_PREFIX, limit, window_seconds)
            .await?;

        if self.users.get_by_email(&email).await?.is_none() {
            return Err(AuthError::IdentityNotFound);
        }

        self.enforce_cooldown(&email).await?;

        let code = generate_otp();
        let otp_hash = self.hash_secret(code.clone()).await?;

        self.pending
            .create_pending(
                PendingFlow::PasswordReset,
                &email,
                &otp_hash,
                self.config.otp_ttl_seconds(),
                self.config.otp_max_attempts(),
                None,
            )
            .await?;

        dispatch_code(self.sender.clone(), email, code, CodePurpose::PasswordReset);
        Ok(())
    }

    /// Re-dispatch a fresh reset code; resets the attempt budget.
    pub async fn reset_resend(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        self.pending
            .get_pending(PendingFlow::PasswordReset, &email)
            .await?
            .ok_or(AuthError::PendingExpiredOrMissing)?;

        self.enforce_cooldown(&email).await?;

        let code = generate_otp();
        let otp_hash = self.hash_secret(code.clone()).await?;

        self.pending
            .create_pending(
                PendingFlow::PasswordReset,
                &email,
                &otp_hash,
                self.config.otp_ttl_seconds(),
                self.config.otp_max_attempts(),
                None,
            )
            .await?;

        dispatch_code(self.sender.clone(), email, code, CodePurpose::PasswordReset);
        Ok(())
    }

    /// Verify the code and hand back a reset-scoped access token.
    pub async fn reset_verify(&self, email: &str, code: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);

        let pending = self
            .pending
            .get_pending(PendingFlow::PasswordReset, &email)
            .await?
            .ok_or(AuthError::PendingExpiredOrMissing)?;

        let attempt = self
            .pending
            .increment_and_check(PendingFlow::PasswordReset, &email, pending.max_attempts)
            .await?;
        if !attempt.allowed {
            self.pending
                .delete_pending(PendingFlow::PasswordReset, &email)
                .await?;
            return Err(AuthError::AttemptsExhausted);
        }

        if !self
            .verify_secret(code.to_string(), pending.otp_hash.clone())
            .await?
        {
            return Err(AuthError::CodeMismatch {
                remaining_attempts: attempt.remaining,
            });
        }

        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::IdentityNotFound)?;

        self.pending
            .delete_pending(PendingFlow::PasswordReset, &email)
            .await?;

        let mut extra = serde_json::Map::new();
        extra.insert("scope".to_string(), RESET_SCOPE.into());
        let token = self
            .authenticator
            .issuer()
            .create_access_token(user.id, Some(extra))?;
        Ok(token)
    }

    /// Set the new password and issue a fresh pair. The caller has already
    /// proven a reset-scoped token for this user id.
    pub async fn reset_finish(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<TokenPair, AuthError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::IdentityNotFound)?;

        let password_hash = self.hash_secret(new_password.to_string()).await?;
        self.users.set_password(user.id, &password_hash).await?;

        info!(user_id = %user.id, "password reset complete");
        self.authenticator.issue(user.id, None).await
    }
}
