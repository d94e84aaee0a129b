pub mod health;
pub mod login;
pub mod me;
pub mod password;
pub mod register;
pub mod types;
pub mod verification;

// common functions for the handlers
use crate::AuthError;
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};
use types::ErrorResponse;

pub(crate) const SERVER_ERROR: &str = "Server error";

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn missing_payload() -> Response {
    error_response(StatusCode::BAD_REQUEST, "Missing payload")
}

/// Map a core error to a response. Faults are logged here and answered with a
/// generic 500; collapsed causes never reach the body.
pub(crate) fn auth_error_response(err: &AuthError) -> Response {
    if err.is_fatal() {
        error!("Request failed: {err}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR);
    }

    match err {
        AuthError::MalformedInput(message) => error_response(StatusCode::BAD_REQUEST, message),
        AuthError::TokenNotFound => {
            error_response(StatusCode::BAD_REQUEST, "Invalid or expired token")
        }
        AuthError::RegistrationFailed { detail } => {
            debug!(detail, "registration failed");
            error_response(StatusCode::BAD_REQUEST, "Registration failed")
        }
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR),
    }
}

/// Returns the token of an `Authorization: Bearer <token>` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}
