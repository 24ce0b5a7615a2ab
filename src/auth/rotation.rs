//! Refresh rotation with single-active-session semantics.
//!
//! Each user has at most one live refresh token. Issuing a pair
//! whitelists the new `jti` and supersedes whatever was live before;
//! rotating consumes the presented `jti` atomically, so a replayed
//! refresh token finds nothing to consume. That situation is treated as
//! theft: the whole session is revoked and the caller gets
//! [`AuthError::TokenReuseDetected`].

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::session::RefreshSessionStore;
use super::tokens::TokenIssuer;

/// Access/refresh pair handed to clients.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct Authenticator {
    issuer: TokenIssuer,
    sessions: Arc<dyn RefreshSessionStore>,
}

impl Authenticator {
    #[must_use]
    pub fn new(issuer: TokenIssuer, sessions: Arc<dyn RefreshSessionStore>) -> Self {
        Self { issuer, sessions }
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Mint a fresh pair and make its refresh `jti` the user's single
    /// live session.
    pub async fn issue(
        &self,
        user_id: Uuid,
        extra_claims: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<TokenPair, AuthError> {
        let refresh = self.issuer.create_refresh_token(user_id)?;
        let access_token = self.issuer.create_access_token(user_id, extra_claims)?;
        self.sessions
            .save(user_id, &refresh.jti, self.issuer.refresh_ttl_seconds())
            .await?;
        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Exchange a refresh token for a new pair, consuming it.
    ///
    /// A structurally valid token whose `jti` is no longer whitelisted is
    /// a replay: it was already rotated away, or never ours. Revoke the
    /// user's live session so the holder of the newer token is cut off
    /// too, and report reuse.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.verify_refresh_token(refresh_token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        match self.sessions.consume_by_token_id(&claims.jti).await? {
            Some(owner) if owner == user_id => self.issue(user_id, None).await,
            Some(_) => {
                // jti whitelisted under a different user: never minted by
                // us in this shape. Already consumed above.
                warn!(user_id = %user_id, "refresh token subject mismatch");
                Err(AuthError::InvalidToken)
            }
            None => {
                warn!(user_id = %user_id, "refresh token reuse detected, revoking session");
                self.sessions.revoke_by_user_id(user_id).await?;
                Err(AuthError::TokenReuseDetected)
            }
        }
    }

    /// Drop the user's live session; their refresh token stops working
    /// immediately. Idempotent.
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.sessions.revoke_by_user_id(user_id).await?;
        info!(user_id = %user_id, "session revoked");
        Ok(())
    }
}
