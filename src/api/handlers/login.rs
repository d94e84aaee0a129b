//! Password login.
//!
//! Unknown email, wrong password and an unreadable stored credential all answer
//! the same 401. Locked and unverified accounts are distinguished (423, 403)
//! because the caller already proved the password.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::debug;

use super::types::{
    ErrorResponse, LoginRequest, LoginResponse, UnverifiedResponse, UserResponse,
};
use super::{auth_error_response, error_response, missing_payload};
use crate::{
    AuthState,
    login::{LoginOutcome, LoginRejection},
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Missing payload", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Email not verified", body = UnverifiedResponse),
        (status = 423, description = "Account temporarily locked", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if request.email.trim().is_empty() || request.password.is_empty() {
        return error_response(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS);
    }

    match state.login().login(&request.email, &request.password).await {
        Ok(LoginOutcome::Accepted(grant)) => (
            StatusCode::OK,
            Json(LoginResponse {
                token: grant.token,
                user: UserResponse {
                    id: grant.account_id.to_string(),
                    email: grant.email,
                    name: grant.name,
                },
            }),
        )
            .into_response(),
        Ok(LoginOutcome::Rejected(LoginRejection::InvalidCredentials { detail })) => {
            debug!(%detail, "invalid credentials");
            error_response(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
        }
        Ok(LoginOutcome::Rejected(LoginRejection::AccountLocked { .. })) => {
            error_response(StatusCode::LOCKED, "Account temporarily locked")
        }
        Ok(LoginOutcome::Rejected(LoginRejection::AccountUnverified { email })) => (
            StatusCode::FORBIDDEN,
            Json(UnverifiedResponse {
                error: "Please verify your email address before logging in. Check your email for a verification code."
                    .to_string(),
                email,
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{Harness, body_json, harness};
    use super::*;
    use crate::session::DEFAULT_ISSUER;
    use anyhow::Result;

    const PASSWORD: &str = "Correct-Horse-Battery-9";

    fn request(email: &str, password: &str) -> Option<Json<LoginRequest>> {
        Some(Json(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }))
    }

    async fn registered(h: &Harness, verify: bool) -> Result<()> {
        h.state
            .accounts()
            .register("user@example.com", PASSWORD, "User")
            .await?;
        if verify {
            let code = h
                .outbox
                .last_code()
                .ok_or_else(|| anyhow::anyhow!("no code mailed"))?;
            h.state.accounts().verify_email(&code).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn login_missing_payload() -> Result<()> {
        let h = harness()?;
        let response = login(Extension(h.state), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_success_returns_token_and_user() -> Result<()> {
        let h = harness()?;
        registered(&h, true).await?;

        let response = login(Extension(h.state.clone()), request("USER@example.com", PASSWORD))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await?;
        assert_eq!(body["user"]["email"], "user@example.com");
        assert_eq!(body["user"]["name"], "User");

        let token = body["token"].as_str().unwrap_or_default();
        let claims = h.state.sessions().verify(token)?;
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(Some(claims.sub.as_str()), body["user"]["id"].as_str());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_wrong_password_look_the_same() -> Result<()> {
        let h = harness()?;
        registered(&h, true).await?;

        let unknown = login(
            Extension(h.state.clone()),
            request("nobody@example.com", PASSWORD),
        )
        .await
        .into_response();
        let wrong = login(
            Extension(h.state),
            request("user@example.com", "Wrong-Horse-Battery-9"),
        )
        .await
        .into_response();

        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(unknown).await?, body_json(wrong).await?);
        Ok(())
    }

    #[tokio::test]
    async fn unverified_is_forbidden_with_email() -> Result<()> {
        let h = harness()?;
        registered(&h, false).await?;

        let response = login(Extension(h.state), request("user@example.com", PASSWORD))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await?;
        assert_eq!(body["email"], "user@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn fifth_failure_locks() -> Result<()> {
        let h = harness()?;
        registered(&h, true).await?;

        for _ in 0..5 {
            let response = login(
                Extension(h.state.clone()),
                request("user@example.com", "Wrong-Horse-Battery-9"),
            )
            .await
            .into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = login(Extension(h.state.clone()), request("user@example.com", PASSWORD))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);

        h.clock.advance(chrono::Duration::minutes(16));
        let response = login(Extension(h.state), request("user@example.com", PASSWORD))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
