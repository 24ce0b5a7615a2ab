//! # Entrata
//!
//! `entrata` is an email/password authentication service with OTP email
//! verification and rotating refresh tokens.
//!
//! ## Registration and password reset
//!
//! Registration creates no account until the emailed six-digit code is
//! verified; until then the password hash lives in a pending record with a
//! bounded attempt budget. Password reset follows the same OTP-gated shape
//! and finishes through a short-lived reset-scoped token. Code dispatch is
//! guarded by per-identity cooldowns on top of fixed-window rate limits.
//!
//! ## Sessions
//!
//! Each user has at most one live refresh token (`RS256` JWT with a `jti`
//! whitelisted in the session store). Refreshing consumes the presented
//! token atomically; presenting it again is treated as theft and revokes
//! the whole session. Public keys are served at `/.well-known/jwks.json`.
//!
//! ## Storage
//!
//! Postgres backs users, rate-limit counters, cooldowns, pending actions,
//! and refresh sessions; every counter or consume operation is a single
//! atomic statement. In-memory implementations of the same traits back the
//! tests and local development.

pub mod api;
pub mod auth;
pub mod cli;
pub mod email;
pub mod flows;
pub mod users;

pub use api::GIT_COMMIT_HASH;
