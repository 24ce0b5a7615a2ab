//! Refresh rotation and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use uuid::Uuid;

use super::types::{RefreshRequest, TokenPairResponse};
use super::{bearer_token, error_response};
use crate::auth::AuthError;
use crate::flows::Flows;

/// Exchange a refresh token for a new pair. A replayed token revokes the
/// whole session and fails.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated", body = TokenPairResponse),
        (status = 401, description = "Invalid, expired, or reused refresh token", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.authenticator().rotate(&request.refresh_token).await {
        Ok(pair) => Json(TokenPairResponse::from_pair(pair)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// Revoke the caller's session; their refresh token stops working.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid access token", body = String)
    ),
    tag = "auth"
)]
pub async fn logout(flows: Extension<Arc<Flows>>, headers: HeaderMap) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()).into_response();
    };

    let claims = match flows.authenticator().issuer().verify_access_token(token) {
        Ok(claims) => claims,
        Err(err) => return error_response(&err).into_response(),
    };
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return error_response(&AuthError::InvalidToken).into_response();
    };

    match flows.authenticator().revoke(user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
