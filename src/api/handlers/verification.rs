//! Email verification endpoints.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use super::types::{
    ErrorResponse, MessageResponse, ResendVerificationRequest, UserResponse, VerifyEmailRequest,
    VerifyEmailResponse,
};
use super::{auth_error_response, error_response, missing_payload};
use crate::AuthState;

const RESEND_MESSAGE: &str =
    "If the account exists and is not verified yet, a new verification code has been sent.";

/// Redeem the 8-digit code mailed at registration and activate the account.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 400, description = "Invalid/expired code", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Verification token is required");
    }

    match state.accounts().verify_email(token).await {
        Ok(account) => (
            StatusCode::OK,
            Json(VerifyEmailResponse {
                message: "Email verified successfully! You can now log in.".to_string(),
                user: UserResponse {
                    id: account.id.to_string(),
                    email: account.email,
                    name: account.name,
                },
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}

/// Resend a verification code (always returns 200 to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Resend accepted", body = MessageResponse),
        (status = 400, description = "Missing payload", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let request: ResendVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if let Err(err) = state.accounts().resend_verification(&request.email).await {
        // Keep the response opaque; the fault is only logged.
        error!("Failed to resend verification: {err}");
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: RESEND_MESSAGE.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{body_json, harness};
    use super::*;
    use anyhow::Result;

    const PASSWORD: &str = "Correct-Horse-Battery-9";

    fn verify_request(token: &str) -> Option<Json<VerifyEmailRequest>> {
        Some(Json(VerifyEmailRequest {
            token: token.to_string(),
        }))
    }

    fn resend_request(email: &str) -> Option<Json<ResendVerificationRequest>> {
        Some(Json(ResendVerificationRequest {
            email: email.to_string(),
        }))
    }

    #[tokio::test]
    async fn verify_email_missing_payload() -> Result<()> {
        let h = harness()?;
        let response = verify_email(Extension(h.state), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_empty_token() -> Result<()> {
        let h = harness()?;
        let response = verify_email(Extension(h.state), verify_request(" "))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_malformed_code() -> Result<()> {
        let h = harness()?;
        let response = verify_email(Extension(h.state), verify_request("12ab"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(body["error"], "Verification code must be 8 digits");
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_single_use() -> Result<()> {
        let h = harness()?;
        h.state
            .accounts()
            .register("user@example.com", PASSWORD, "User")
            .await?;
        let code = h.outbox.last_code().unwrap_or_default();

        let first = verify_email(Extension(h.state.clone()), verify_request(&code))
            .await
            .into_response();
        assert_eq!(first.status(), StatusCode::OK);
        let body = body_json(first).await?;
        assert_eq!(body["user"]["email"], "user@example.com");

        let second = verify_email(Extension(h.state), verify_request(&code))
            .await
            .into_response();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        let body = body_json(second).await?;
        assert_eq!(body["error"], "Invalid or expired token");
        Ok(())
    }

    #[tokio::test]
    async fn resend_missing_payload() -> Result<()> {
        let h = harness()?;
        let response = resend_verification(Extension(h.state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn resend_is_opaque() -> Result<()> {
        let h = harness()?;
        h.state
            .accounts()
            .register("user@example.com", PASSWORD, "User")
            .await?;

        let unknown = resend_verification(
            Extension(h.state.clone()),
            resend_request("nobody@example.com"),
        )
        .await
        .into_response();
        let invalid = resend_verification(Extension(h.state.clone()), resend_request("nope"))
            .await
            .into_response();
        let known = resend_verification(Extension(h.state), resend_request("user@example.com"))
            .await
            .into_response();

        assert_eq!(unknown.status(), StatusCode::OK);
        assert_eq!(invalid.status(), StatusCode::OK);
        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(body_json(unknown).await?, body_json(known).await?);
        Ok(())
    }
}
