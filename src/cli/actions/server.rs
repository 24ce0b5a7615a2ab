use crate::api;
use crate::auth::tokens::SigningKeys;
use crate::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use std::fs;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            issuer,
            kid,
            private_key_path,
            public_key_path,
        } => {
            let private_pem = fs::read_to_string(&private_key_path)
                .with_context(|| format!("Failed to read private key: {private_key_path}"))?;
            let public_pem = fs::read_to_string(&public_key_path)
                .with_context(|| format!("Failed to read public key: {public_key_path}"))?;
            let keys = SigningKeys::from_pem(&private_pem, &public_pem, &kid)
                .context("Failed to load signing keys")?;

            // The issuer lands verbatim in the `iss` claim; insist on a URL.
            let issuer = Url::parse(&issuer)
                .with_context(|| format!("Invalid JWT issuer: {issuer}"))?
                .to_string();

            let auth_config = AuthConfig::new(issuer);

            api::new(port, dsn, keys, auth_config).await?;
        }
    }

    Ok(())
}
