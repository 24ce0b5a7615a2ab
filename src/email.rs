//! Verification-code delivery.
//!
//! Flows hand a freshly generated code to a [`CodeSender`] and move on;
//! delivery happens off the request path via `tokio::spawn`, so a slow
//! or failing mail provider never blocks registration or reset. The
//! default sender for local dev is [`LogCodeSender`], which logs the
//! code instead of sending real email.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Which flow the code belongs to; senders pick the template from this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodePurpose {
    Registration,
    PasswordReset,
}

impl CodePurpose {
    #[must_use]
    pub fn template(self) -> &'static str {
        match self {
            Self::Registration => "verify_email",
            Self::PasswordReset => "reset_password",
        }
    }
}

impl fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template())
    }
}

/// Delivery abstraction for one-time codes.
#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Deliver `code` to `email`, or return an error to be logged.
    async fn send_code(&self, email: &str, code: &str, purpose: CodePurpose) -> Result<()>;
}

/// Local dev sender that logs the code instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send_code(&self, email: &str, code: &str, purpose: CodePurpose) -> Result<()> {
        info!(
            to_email = %email,
            template = %purpose.template(),
            code = %code,
            "verification code send stub"
        );
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged, never surfaced to the
/// caller: the pending record already exists and resend covers gaps.
pub fn dispatch_code(sender: Arc<dyn CodeSender>, email: String, code: String, purpose: CodePurpose) {
    tokio::spawn(async move {
        if let Err(err) = sender.send_code(&email, &code, purpose).await {
            error!(to_email = %email, template = %purpose.template(), "code delivery failed: {err}");
        }
    });
}
