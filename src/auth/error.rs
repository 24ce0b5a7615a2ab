//! Error taxonomy shared by the auth core and the workflow layer.
//!
//! Store and crypto failures are translated into one of these kinds at the
//! orchestrator/flow boundary. Raw infrastructure errors (connection loss,
//! serialization) stay `Internal` and are never mapped to a domain kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The email is already registered.
    #[error("email already registered")]
    IdentityConflict,

    /// No account exists for the email. Password-reset start reports this
    /// accurately; suppressing it (anti-enumeration) is an HTTP-layer policy.
    #[error("no account for this email")]
    IdentityNotFound,

    /// Fixed-window limit exceeded for the attempted action.
    #[error("too many attempts, retry after {window_seconds}s")]
    RateLimited { window_seconds: i64 },

    /// A code was dispatched recently; the cooldown has not elapsed.
    #[error("code already sent, retry in {seconds_left}s")]
    CooldownActive { seconds_left: i64 },

    /// No in-flight OTP workflow (never started, expired, or discarded).
    #[error("request expired, restart the workflow")]
    PendingExpiredOrMissing,

    /// The OTP attempt budget is spent and the pending record is gone.
    #[error("verification attempts exhausted, restart the workflow")]
    AttemptsExhausted,

    /// The OTP did not match.
    #[error("incorrect code, {remaining_attempts} attempts left")]
    CodeMismatch { remaining_attempts: i64 },

    /// Unknown email or wrong password; merged to avoid enumeration.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Signature, claim, or expiry failure on an access or refresh token.
    #[error("invalid or expired token")]
    InvalidToken,

    /// A refresh token was presented after consumption. The current session
    /// has already been revoked by the orchestrator; log as a security event.
    #[error("refresh token reused, session revoked")]
    TokenReuseDetected,

    /// Infrastructure failure; surfaced as a generic internal error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True for the kinds that indicate a possible attack rather than a
    /// user mistake, which callers should log at elevated severity.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::TokenReuseDetected)
    }
}
