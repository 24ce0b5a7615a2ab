//! Login endpoint.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::error_response;
use super::types::{LoginRequest, TokenPairResponse};
use crate::flows::Flows;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenPairResponse),
        (status = 401, description = "Invalid email or password", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    flows: Extension<Arc<Flows>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match flows.login(&request.email, &request.password).await {
        Ok(pair) => Json(TokenPairResponse::from_pair(pair)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
