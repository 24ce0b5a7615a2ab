//! Registration: start, resend, finish.
//!
//! No user row exists until the emailed code is verified; the pending
//! record carries the password hash in its payload until then.

use anyhow::anyhow;
use tracing::info;

use super::{generate_otp, normalize_email, Flows};
use crate::auth::pending::PendingFlow;
use crate::auth::{AuthError, TokenPair};
use crate::email::{dispatch_code, CodePurpose};
use crate::users::AddOutcome;

const REGISTER_PREFIX: &str = "register";

impl Flows {
    /// Begin registration: stash the password hash in a pending record and
    /// dispatch a verification code. Nothing touches the users table yet.
    pub async fn register_start(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        let (limit, window_seconds) = self.config().register_limit();
        self.enforce_rate_limit(&email, REGISTER_PREFIX, limit, window_seconds)
            .await?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::IdentityConflict);
        }

        self.enforce_cooldown(&email).await?;

        let password_hash = self.hash_secret(password.to_string()).await?;
        let code = generate_otp();
        let otp_hash = self.hash_secret(code.clone()).await?;

        self.pending
            .create_pending(
                PendingFlow::Registration,
                &email,
                &otp_hash,
                self.config.otp_ttl_seconds(),
                self.config.otp_max_attempts(),
                Some(&password_hash),
            )
            .await?;

        dispatch_code(self.sender.clone(), email, code, CodePurpose::Registration);
        Ok(())
    }

    /// Re-dispatch a fresh code for an in-flight registration. Overwrites
    /// the pending record, which resets the attempt budget.
    pub async fn register_resend(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        let pending = self
            .pending
            .get_pending(PendingFlow::Registration, &email)
            .await?
            .ok_or(AuthError::PendingExpiredOrMissing)?;

        self.enforce_cooldown(&email).await?;

        let code = generate_otp();
        let otp_hash = self.hash_secret(code.clone()).await?;

        self.pending
            .create_pending(
                PendingFlow::Registration,
                &email,
                &otp_hash,
                self.config.otp_ttl_seconds(),
                self.config.otp_max_attempts(),
                pending.payload.as_deref(),
            )
            .await?;

        dispatch_code(self.sender.clone(), email, code, CodePurpose::Registration);
        Ok(())
    }

    /// Verify the code, create the account, and log the new user in.
    pub async fn register_finish(
        &self,
        email: &str,
        code: &str,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let pending = self
            .pending
            .get_pending(PendingFlow::Registration, &email)
            .await?
            .ok_or(AuthError::PendingExpiredOrMissing)?;

        let attempt = self
            .pending
            .increment_and_check(PendingFlow::Registration, &email, pending.max_attempts)
            .await?;
        if !attempt.allowed {
            self.pending
                .delete_pending(PendingFlow::Registration, &email)
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

        let password_hash = pending
            .payload
            .ok_or_else(|| anyhow!("pending registration record has no password hash"))?;

        let user = match self.users.add(&email, &password_hash).await? {
            AddOutcome::Created(user) => user,
            AddOutcome::Conflict => {
                // Someone registered this email between start and finish.
                self.pending
                    .delete_pending(PendingFlow::Registration, &email)
                    .await?;
                return Err(AuthError::IdentityConflict);
            }
        };

        self.pending
            .delete_pending(PendingFlow::Registration, &email)
            .await?;

        info!(user_id = %user.id, "registration complete");
        self.authenticator.issue(user.id, None).await
    }
}
