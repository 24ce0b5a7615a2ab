//! RS256 token issuance and verification.
//!
//! Access tokens are stateless and short-lived; refresh tokens carry a
//! `type` marker plus a fresh `jti` and are only as valid as the session
//! store says they are. The signing key material is loaded once into an
//! immutable [`SigningKeys`] value and passed by reference; there is no
//! process-wide key state.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::AuthError;

const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Single published key entry, shaped for standard JWKS consumers.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub public_key_use: String,
    pub alg: String,
    /// Base64url modulus.
    pub n: String,
    /// Base64url public exponent.
    pub e: String,
}

/// JSON Web Key Set: one entry per active signing key id.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Immutable key material for the single active signing key.
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    kid: String,
    jwks: JwkSet,
}

impl SigningKeys {
    /// Load an RSA keypair from PEM. The JWKS entry is derived from the
    /// public key here, once, so serving it later cannot fail.
    pub fn from_pem(private_pem: &str, public_pem: &str, kid: &str) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .context("invalid RSA private key PEM")?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .context("invalid RSA public key PEM")?;

        let public = RsaPublicKey::from_public_key_pem(public_pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
            .map_err(|err| anyhow!("unsupported RSA public key PEM: {err}"))?;

        let jwk = Jwk {
            kty: "RSA".to_string(),
            kid: kid.to_string(),
            public_key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        };

        Ok(Self {
            encoding,
            decoding,
            kid: kid.to_string(),
            jwks: JwkSet { keys: vec![jwk] },
        })
    }
}

/// Claims carried by an access token. `extra` flattens caller-provided
/// claims (e.g. a scope marker for the password-reset token).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Claims carried by a refresh token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly minted refresh token plus the `jti` that was embedded in it,
/// so callers never have to decode their own token to learn it.
#[derive(Clone, Debug)]
pub struct IssuedRefresh {
    pub token: String,
    pub jti: String,
}

pub struct TokenIssuer {
    keys: SigningKeys,
    issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        keys: SigningKeys,
        issuer: impl Into<String>,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid.clone());
        header
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Tokens are short-lived on purpose; no clock slack.
        validation.leeway = 0;
        validation
    }

    /// Sign a short-lived access token for `user_id`.
    pub fn create_access_token(
        &self,
        user_id: Uuid,
        extra_claims: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.access_ttl_seconds,
            extra: extra_claims.unwrap_or_default(),
        };
        encode(&self.header(), &claims, &self.keys.encoding).context("failed to sign access token")
    }

    /// Sign a refresh token with a fresh random `jti`.
    pub fn create_refresh_token(&self, user_id: Uuid) -> Result<IssuedRefresh> {
        let now = Utc::now().timestamp();
        let jti = Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            jti: jti.clone(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.refresh_ttl_seconds,
        };
        let token = encode(&self.header(), &claims, &self.keys.encoding)
            .context("failed to sign refresh token")?;
        Ok(IssuedRefresh { token, jti })
    }

    /// Validate signature, issuer, expiry, and required claims. All
    /// violations (including expiry) surface as `InvalidToken`.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = decode::<AccessClaims>(token, &self.keys.decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("access token rejected: {err}");
                AuthError::InvalidToken
            })?;
        // A refresh token also satisfies the required claims; its marker
        // ends up in `extra`, keep it out of the access path.
        if claims.extra.contains_key("type") {
            debug!("access token rejected: refresh marker present");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// As `verify_access_token`, plus the `type == "refresh"` marker.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims = decode::<RefreshClaims>(token, &self.keys.decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("refresh token rejected: {err}");
                AuthError::InvalidToken
            })?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            debug!("refresh token rejected: wrong type marker");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Active public key(s) for external verifiers.
    #[must_use]
    pub fn get_public_keys(&self) -> &JwkSet {
        &self.keys.jwks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/jwt_test_private.pem"
    ));
    const TEST_PUBLIC_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/jwt_test_public.pem"
    ));

    fn issuer() -> TokenIssuer {
        let keys =
            SigningKeys::from_pem(TEST_PRIVATE_PEM, TEST_PUBLIC_PEM, "test-key").expect("keys");
        TokenIssuer::new(keys, "https://auth.entrata.dev", 900, 60 * 60 * 24 * 30)
    }

    #[test]
    fn access_token_round_trip() {
        let issuer = issuer();
        let user = Uuid::new_v4();
        let token = issuer.create_access_token(user, None).expect("token");
        let claims = issuer.verify_access_token(&token).expect("claims");
        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.iss, "https://auth.entrata.dev");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn extra_claims_are_flattened() {
        let issuer = issuer();
        let mut extra = serde_json::Map::new();
        extra.insert("scope".to_string(), "reset_password".into());
        let token = issuer
            .create_access_token(Uuid::new_v4(), Some(extra))
            .expect("token");
        let claims = issuer.verify_access_token(&token).expect("claims");
        assert_eq!(
            claims.extra.get("scope").and_then(|v| v.as_str()),
            Some("reset_password")
        );
    }

    #[test]
    fn refresh_tokens_carry_unique_jti() {
        let issuer = issuer();
        let user = Uuid::new_v4();
        let first = issuer.create_refresh_token(user).expect("token");
        let second = issuer.create_refresh_token(user).expect("token");
        assert_ne!(first.jti, second.jti);

        let claims = issuer.verify_refresh_token(&first.token).expect("claims");
        assert_eq!(claims.jti, first.jti);
        assert_eq!(claims.token_type, "refresh");
        assert_eq!(claims.sub, user.to_string());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let issuer = issuer();
        let refresh = issuer
            .create_refresh_token(Uuid::new_v4())
            .expect("token");
        assert!(matches!(
            issuer.verify_access_token(&refresh.token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let issuer = issuer();
        let token = issuer
            .create_access_token(Uuid::new_v4(), None)
            .expect("token");
        assert!(matches!(
            issuer.verify_refresh_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys =
            SigningKeys::from_pem(TEST_PRIVATE_PEM, TEST_PUBLIC_PEM, "test-key").expect("keys");
        let issuer = TokenIssuer::new(keys, "https://auth.entrata.dev", -10, -10);
        let token = issuer
            .create_access_token(Uuid::new_v4(), None)
            .expect("token");
        assert!(matches!(
            issuer.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let issuer = issuer();
        let keys =
            SigningKeys::from_pem(TEST_PRIVATE_PEM, TEST_PUBLIC_PEM, "test-key").expect("keys");
        let other = TokenIssuer::new(keys, "https://evil.example", 900, 900);
        let token = other
            .create_access_token(Uuid::new_v4(), None)
            .expect("token");
        assert!(matches!(
            issuer.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issuer = issuer();
        let token = issuer
            .create_access_token(Uuid::new_v4(), None)
            .expect("token");
        let mut tampered = token;
        tampered.pop();
        tampered.push('A');
        assert!(matches!(
            issuer.verify_access_token(&tampered),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn jwks_exposes_the_active_key() {
        let issuer = issuer();
        let jwks = issuer.get_public_keys();
        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.kid, "test-key");
        assert_eq!(key.public_key_use, "sig");
        assert_eq!(key.alg, "RS256");
        assert!(!key.n.is_empty());
        // 65537 == AQAB in base64url.
        assert_eq!(key.e, "AQAB");
    }
}
