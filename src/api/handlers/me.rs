//! The authenticated caller's profile.
//!
//! Sessions are stateless: a valid, unexpired bearer token is accepted as is
//! and only the account behind it is looked up.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{ErrorResponse, UserResponse};
use super::{SERVER_ERROR, error_response, extract_bearer_token};
use crate::{AuthState, store::AccountStore};

const UNAUTHORIZED: &str = "Unauthorized";

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = UserResponse),
        (status = 401, description = "Missing, invalid or expired session token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED);
    };

    let account_id = match state.sessions().validate(token) {
        Ok(account_id) => account_id,
        Err(err) => {
            debug!("Rejected session token: {err}");
            return error_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED);
        }
    };

    match state.store().find_account_by_id(account_id).await {
        Ok(Some(account)) => (
            StatusCode::OK,
            Json(UserResponse {
                id: account.id.to_string(),
                email: account.email,
                name: account.name,
            }),
        )
            .into_response(),
        Ok(None) => error_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED),
        Err(err) => {
            error!("Failed to fetch /me profile: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR)
        }
    }
}
