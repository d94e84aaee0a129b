//! Error taxonomy shared by the core flows.
//!
//! Business rejections of a login (bad credentials, lock, unverified) are not
//! errors; they are [`crate::login::LoginRejection`] values. `AuthError` covers
//! bad input, spent tokens and faults.

use crate::{credential::CredentialError, session::SessionError, store::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Never existed, already used, expired, or the owning account is gone.
    #[error("token not found")]
    TokenNotFound,

    /// Collapsed registration failure; `detail` is for logs only.
    #[error("registration failed")]
    RegistrationFailed { detail: &'static str },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for faults that should be logged at `error` and answered with 500.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Credential(_) | Self::Session(_) | Self::StoreUnavailable(_) | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn store_errors_convert_to_unavailable() {
        let err: AuthError = StoreError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn client_errors_are_not_fatal() {
        assert!(!AuthError::TokenNotFound.is_fatal());
        assert!(!AuthError::MalformedInput("code".to_string()).is_fatal());
        assert!(
            !AuthError::RegistrationFailed {
                detail: "duplicate email"
            }
            .is_fatal()
        );
    }

    #[test]
    fn registration_detail_is_not_displayed() {
        let err = AuthError::RegistrationFailed {
            detail: "duplicate email",
        };
        assert_eq!(err.to_string(), "registration failed");
    }
}
