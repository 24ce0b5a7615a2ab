//! Published signing keys for external token verifiers.

use axum::{extract::Extension, response::Json};
use std::sync::Arc;

use crate::auth::tokens::JwkSet;
use crate::flows::Flows;

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Active signing keys", body = JwkSet)
    ),
    tag = "auth"
)]
pub async fn jwks(flows: Extension<Arc<Flows>>) -> Json<JwkSet> {
    Json(flows.authenticator().issuer().get_public_keys().clone())
}
