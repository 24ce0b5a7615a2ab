//! Core authentication building blocks: rate limiting, pending email
//! verification flows, password hashing, token issuance, and refresh
//! session rotation.
//!
//! Everything here is transport-agnostic; the HTTP surface in
//! [`crate::api`] and the workflows in [`crate::flows`] compose these
//! pieces.

pub mod error;
pub mod hasher;
pub mod pending;
pub mod rate_limit;
pub mod rotation;
pub mod session;
pub mod tokens;

pub use error::AuthError;
pub use rotation::{Authenticator, TokenPair};

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_OTP_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_REGISTER_LIMIT: i64 = 5;
const DEFAULT_REGISTER_WINDOW_SECONDS: i64 = 60 * 60;
const DEFAULT_LOGIN_LIMIT: i64 = 10;
const DEFAULT_LOGIN_WINDOW_SECONDS: i64 = 15 * 60;
const DEFAULT_RESET_LIMIT: i64 = 5;
const DEFAULT_RESET_WINDOW_SECONDS: i64 = 60 * 60;

/// Tunables for the authentication flows. `issuer` is the only required
/// field; everything else has a conservative default.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    otp_max_attempts: i64,
    resend_cooldown_seconds: i64,
    register_limit: i64,
    register_window_seconds: i64,
    login_limit: i64,
    login_window_seconds: i64,
    reset_limit: i64,
    reset_window_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self {
            issuer,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            register_limit: DEFAULT_REGISTER_LIMIT,
            register_window_seconds: DEFAULT_REGISTER_WINDOW_SECONDS,
            login_limit: DEFAULT_LOGIN_LIMIT,
            login_window_seconds: DEFAULT_LOGIN_WINDOW_SECONDS,
            reset_limit: DEFAULT_RESET_LIMIT,
            reset_window_seconds: DEFAULT_RESET_WINDOW_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_max_attempts(mut self, attempts: i64) -> Self {
        self.otp_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_register_limit(mut self, limit: i64, window_seconds: i64) -> Self {
        self.register_limit = limit;
        self.register_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn with_login_limit(mut self, limit: i64, window_seconds: i64) -> Self {
        self.login_limit = limit;
        self.login_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn with_reset_limit(mut self, limit: i64, window_seconds: i64) -> Self {
        self.reset_limit = limit;
        self.reset_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_max_attempts(&self) -> i64 {
        self.otp_max_attempts
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn register_limit(&self) -> (i64, i64) {
        (self.register_limit, self.register_window_seconds)
    }

    #[must_use]
    pub fn login_limit(&self) -> (i64, i64) {
        (self.login_limit, self.login_window_seconds)
    }

    #[must_use]
    pub fn reset_limit(&self) -> (i64, i64) {
        (self.reset_limit, self.reset_window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://auth.entrata.dev".to_string());

        assert_eq!(config.issuer(), "https://auth.entrata.dev");
        assert_eq!(config.access_ttl_seconds(), super::DEFAULT_ACCESS_TTL_SECONDS);
        assert_eq!(
            config.refresh_ttl_seconds(),
            super::DEFAULT_REFRESH_TTL_SECONDS
        );
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(config.otp_max_attempts(), super::DEFAULT_OTP_MAX_ATTEMPTS);
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );
        assert_eq!(
            config.register_limit(),
            (
                super::DEFAULT_REGISTER_LIMIT,
                super::DEFAULT_REGISTER_WINDOW_SECONDS
            )
        );

        let config = config
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(3600)
            .with_otp_ttl_seconds(120)
            .with_otp_max_attempts(3)
            .with_resend_cooldown_seconds(10)
            .with_register_limit(2, 30)
            .with_login_limit(4, 40)
            .with_reset_limit(6, 50);

        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.refresh_ttl_seconds(), 3600);
        assert_eq!(config.otp_ttl_seconds(), 120);
        assert_eq!(config.otp_max_attempts(), 3);
        assert_eq!(config.resend_cooldown_seconds(), 10);
        assert_eq!(config.register_limit(), (2, 30));
        assert_eq!(config.login_limit(), (4, 40));
        assert_eq!(config.reset_limit(), (6, 50));
    }
}
