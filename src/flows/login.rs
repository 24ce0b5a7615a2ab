//! Email/password login.

use tracing::info;

use super::{normalize_email, Flows};
use crate::auth::{AuthError, TokenPair};

const LOGIN_PREFIX: &str = "login";

impl Flows {
    /// Authenticate and issue a fresh token pair. Unknown email and wrong
    /// password are indistinguishable to the caller, and the limiter runs
    /// before the credential check so probing costs attempts either way.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let (limit, window_seconds) = self.config().login_limit();
        self.enforce_rate_limit(&email, LOGIN_PREFIX, limit, window_seconds)
            .await?;

        let Some(user) = self.users.get_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify_secret(password.to_string(), user.password_hash.clone())
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "login succeeded");
        self.authenticator.issue(user.id, None).await
    }
}
