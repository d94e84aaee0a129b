//! Forgot/reset password endpoints.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use super::types::{ErrorResponse, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest};
use super::{auth_error_response, error_response, missing_payload};
use crate::{
    AuthState,
    validation::{normalize_email, valid_email},
};

const FORGOT_MESSAGE: &str =
    "If an account with that email exists, we've sent a password reset link to it.";

fn message(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Mail a reset link to a verified account. The response never reveals
/// whether the email is registered.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset accepted", body = MessageResponse),
        (status = 400, description = "Missing or badly formatted email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email is required");
    }
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email format");
    }

    if let Err(err) = state.accounts().forgot_password(&email).await {
        error!("Failed to issue password reset: {err}");
    }

    message(StatusCode::OK, FORGOT_MESSAGE)
}

/// Redeem a reset token and set a new password.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid/expired token or weak password", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if request.token.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Reset token is required");
    }
    if request.new_password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "New password is required");
    }

    match state
        .accounts()
        .reset_password(&request.token, &request.new_password)
        .await
    {
        Ok(()) => message(
            StatusCode::OK,
            "Password has been successfully reset. You can now log in with your new password.",
        ),
        Err(err) => auth_error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{Harness, body_json, harness};
    use super::*;
    use crate::login::LoginOutcome;
    use anyhow::Result;

    const PASSWORD: &str = "Correct-Horse-Battery-9";
    const NEW_PASSWORD: &str = "Brand-New-Secret-42";

    fn forgot_request(email: &str) -> Option<Json<ForgotPasswordRequest>> {
        Some(Json(ForgotPasswordRequest {
            email: email.to_string(),
        }))
    }

    fn reset_request(token: &str, new_password: &str) -> Option<Json<ResetPasswordRequest>> {
        Some(Json(ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        }))
    }

    async fn verified(h: &Harness) -> Result<()> {
        h.state
            .accounts()
            .register("user@example.com", PASSWORD, "User")
            .await?;
        let code = h
            .outbox
            .last_code()
            .ok_or_else(|| anyhow::anyhow!("no code mailed"))?;
        h.state.accounts().verify_email(&code).await?;
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_bad_email() -> Result<()> {
        let h = harness()?;
        let missing = forgot_password(Extension(h.state.clone()), forgot_request("  "))
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let invalid = forgot_password(Extension(h.state), forgot_request("nope"))
            .await
            .into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_is_opaque() -> Result<()> {
        let h = harness()?;
        verified(&h).await?;
        let sent_before = h.outbox.messages().len();

        let unknown = forgot_password(
            Extension(h.state.clone()),
            forgot_request("nobody@example.com"),
        )
        .await
        .into_response();
        assert_eq!(h.outbox.messages().len(), sent_before);

        let known = forgot_password(Extension(h.state), forgot_request("user@example.com"))
            .await
            .into_response();
        assert_eq!(h.outbox.messages().len(), sent_before + 1);

        assert_eq!(unknown.status(), StatusCode::OK);
        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(body_json(unknown).await?, body_json(known).await?);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_flow() -> Result<()> {
        let h = harness()?;
        verified(&h).await?;

        let _ = forgot_password(Extension(h.state.clone()), forgot_request("user@example.com"))
            .await
            .into_response();
        let token = h
            .outbox
            .last_reset_token()
            .ok_or_else(|| anyhow::anyhow!("no reset link mailed"))?;

        let weak = reset_password(Extension(h.state.clone()), reset_request(&token, "weak"))
            .await
            .into_response();
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);

        let response = reset_password(Extension(h.state.clone()), reset_request(&token, NEW_PASSWORD))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let reused = reset_password(Extension(h.state.clone()), reset_request(&token, NEW_PASSWORD))
            .await
            .into_response();
        assert_eq!(reused.status(), StatusCode::BAD_REQUEST);

        let outcome = h.state.login().login("user@example.com", NEW_PASSWORD).await?;
        assert!(matches!(outcome, LoginOutcome::Accepted(_)));
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_requires_fields() -> Result<()> {
        let h = harness()?;
        let no_token = reset_password(Extension(h.state.clone()), reset_request("", NEW_PASSWORD))
            .await
            .into_response();
        assert_eq!(no_token.status(), StatusCode::BAD_REQUEST);

        let no_password = reset_password(Extension(h.state), reset_request("abc", ""))
            .await
            .into_response();
        assert_eq!(no_password.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
