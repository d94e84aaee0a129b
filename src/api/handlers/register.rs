//! Account registration.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

use super::types::{ErrorResponse, RegisterRequest, RegisterResponse};
use super::{auth_error_response, missing_payload};
use crate::AuthState;

/// Create an unverified account and mail its 8-digit verification code.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created, verification code sent", body = RegisterResponse),
        (status = 400, description = "Invalid input or registration failed", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    match state
        .accounts()
        .register(&request.email, &request.password, &request.name)
        .await
    {
        Ok(account) => (
            StatusCode::OK,
            Json(RegisterResponse {
                message: "Registration successful. Please check your email to verify your account."
                    .to_string(),
                email: account.email,
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}
