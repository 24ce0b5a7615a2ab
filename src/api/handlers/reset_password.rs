//! Password-reset endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use uuid::Uuid;

use super::types::{
    EmailRequest, ResetFinishRequest, ResetTokenResponse, TokenPairResponse, VerifyCodeRequest,
};
use super::{bearer_token, error_response, valid_password};
use crate::auth::AuthError;
use crate::flows::{Flows, RESET_SCOPE};

/// Start a password reset. Always 204 for unknown emails: response shape
/// must not reveal whether an account exists.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = EmailRequest,
    responses(
        (status = 204, description = "Reset code dispatched if the account exists"),
        (status = 429, description = "Rate limited or cooldown active", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_start(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.reset_start(&request.email).await {
        Ok(()) | Err(AuthError::IdentityNotFound) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// Re-dispatch the reset code.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password/resend",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Fresh code dispatched"),
        (status = 410, description = "No reset in flight", body = String),
        (status = 429, description = "Cooldown active", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_resend(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.reset_resend(&request.email).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// Verify the reset code; returns a short-lived token for the finish step.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Code accepted", body = ResetTokenResponse),
        (status = 400, description = "Incorrect code", body = String),
        (status = 410, description = "No reset in flight or attempts exhausted", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_verify(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.reset_verify(&request.email, &request.code).await {
        Ok(reset_token) => Json(ResetTokenResponse {
            reset_token,
            token_type: "bearer".to_string(),
        })
        .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// Set the new password. Requires the reset-scoped bearer token from
/// verify; an ordinary access token is rejected.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password/finish",
    request_body = ResetFinishRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer reset token")
    ),
    responses(
        (status = 200, description = "Password changed", body = TokenPairResponse),
        (status = 400, description = "Invalid password", body = String),
        (status = 401, description = "Missing or invalid reset token", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_finish(
    flows: Extension<Arc<Flows>>,
    headers: HeaderMap,
    payload: Option<Json<ResetFinishRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    if !valid_password(&request.new_password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()).into_response();
    };
    let claims = match flows.authenticator().issuer().verify_access_token(token) {
        Ok(claims) => claims,
        Err(err) => return error_response(&err).into_response(),
    };
    if claims.extra.get("scope").and_then(|v| v.as_str()) != Some(RESET_SCOPE) {
        return error_response(&AuthError::InvalidToken).into_response();
    }
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return error_response(&AuthError::InvalidToken).into_response();
    };

    match flows.reset_finish(user_id, &request.new_password).await {
        Ok(pair) => Json(TokenPairResponse::from_pair(pair)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
