//! API handlers and shared utilities.
//!
//! Handlers stay thin: parse and validate the payload, call the matching
//! workflow, and map its [`AuthError`] to a status code here in one place.

pub mod health;
pub mod jwks;
pub mod login;
pub mod register;
pub mod reset_password;
pub mod session;
pub mod types;

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use regex::Regex;
use tracing::{error, warn};

use crate::auth::AuthError;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Lightweight email sanity check used by handlers before calling a flow.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Length-only password policy; composition rules add little entropy.
#[must_use]
pub fn valid_password(password: &str) -> bool {
    (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password.chars().count())
}

/// Extract the token from an `Authorization: Bearer ...` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Single mapping from workflow errors to HTTP responses. Security events
/// are logged at warn before the caller-facing message is returned;
/// internal details never leave the process.
pub(crate) fn error_response(err: &AuthError) -> (StatusCode, String) {
    if err.is_security_event() {
        warn!("security event: {err}");
    }
    let status = match err {
        AuthError::IdentityConflict => StatusCode::CONFLICT,
        AuthError::IdentityNotFound => StatusCode::NOT_FOUND,
        AuthError::RateLimited { .. } | AuthError::CooldownActive { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AuthError::PendingExpiredOrMissing | AuthError::AttemptsExhausted => StatusCode::GONE,
        AuthError::CodeMismatch { .. } => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::InvalidToken
        | AuthError::TokenReuseDetected => StatusCode::UNAUTHORIZED,
        AuthError::Internal(inner) => {
            error!("internal error: {inner:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            );
        }
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn email_validation() {
        assert!(valid_email("ada@example.com"));
        assert!(valid_email("a.b+c@sub.example.org"));
        assert!(!valid_email("nope"));
        assert!(!valid_email("two@at@signs"));
        assert!(!valid_email("a b@example.com"));
        assert!(!valid_email("no-dot@example"));
    }

    #[test]
    fn password_length_bounds() {
        assert!(!valid_password("short"));
        assert!(valid_password("eight8ch"));
        assert!(valid_password(&"x".repeat(128)));
        assert!(!valid_password(&"x".repeat(129)));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            error_response(&AuthError::IdentityConflict).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(&AuthError::RateLimited { window_seconds: 60 }).0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            error_response(&AuthError::CooldownActive { seconds_left: 9 }).0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            error_response(&AuthError::PendingExpiredOrMissing).0,
            StatusCode::GONE
        );
        assert_eq!(
            error_response(&AuthError::AttemptsExhausted).0,
            StatusCode::GONE
        );
        assert_eq!(
            error_response(&AuthError::CodeMismatch {
                remaining_attempts: 1
            })
            .0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(&AuthError::TokenReuseDetected).0,
            StatusCode::UNAUTHORIZED
        );

        let (status, message) = error_response(&AuthError::Internal(anyhow::anyhow!("boom")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal error");
    }
}
