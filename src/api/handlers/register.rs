//! Registration endpoints.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::types::{EmailRequest, RegisterRequest, TokenPairResponse, VerifyCodeRequest};
use super::{error_response, valid_email, valid_password};
use crate::flows::{normalize_email, Flows};

/// Start registration: dispatch a verification code. No account exists
/// until the code is verified.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Verification code dispatched"),
        (status = 400, description = "Invalid email or password", body = String),
        (status = 409, description = "Email already registered", body = String),
        (status = 429, description = "Rate limited or cooldown active", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if !valid_password(&request.password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    match flows.register_start(&email, &request.password).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// Verify the emailed code, creating the account and logging it in.
#[utoipa::path(
    post,
    path = "/v1/auth/register/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Account created", body = TokenPairResponse),
        (status = 400, description = "Incorrect code", body = String),
        (status = 410, description = "No registration in flight or attempts exhausted", body = String)
    ),
    tag = "auth"
)]
pub async fn register_verify(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.register_finish(&request.email, &request.code).await {
        Ok(pair) => Json(TokenPairResponse::from_pair(pair)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// Re-dispatch the registration code.
#[utoipa::path(
    post,
    path = "/v1/auth/register/resend",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Fresh code dispatched"),
        (status = 410, description = "No registration in flight", body = String),
        (status = 429, description = "Cooldown active", body = String)
    ),
    tag = "auth"
)]
pub async fn register_resend(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.register_resend(&request.email).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
