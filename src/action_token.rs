//! Single-use action tokens for email verification and password reset.
//!
//! The raw secret only ever travels to the user by email. The store keeps a
//! SHA-256 of it, and redemption is a single conditional update so a secret can
//! be claimed at most once.

use crate::{
    clock::Clock,
    email::{self, EmailMessage, Mailer},
    error::AuthError,
    store::{Account, Store, StoreError},
};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Attempts at inserting a token before giving up on secret collisions.
const INSERT_ATTEMPTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    VerifyEmail,
    ResetPassword,
}

impl Purpose {
    #[must_use]
    pub fn ttl(self) -> Duration {
        match self {
            Self::VerifyEmail => Duration::hours(24),
            Self::ResetPassword => Duration::hours(1),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "verify_email" => Some(Self::VerifyEmail),
            "reset_password" => Some(Self::ResetPassword),
            _ => None,
        }
    }
}

/// Persisted token record. The secret itself is never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionToken {
    pub id: Uuid,
    pub account_id: Uuid,
    pub email: String,
    pub secret_hash: Vec<u8>,
    pub purpose: Purpose,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl ActionToken {
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

/// A freshly created token together with the raw secret to deliver.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: ActionToken,
    pub secret: String,
}

#[must_use]
pub fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

/// Generates a raw secret in the purpose's format: 8 decimal digits for
/// email verification, 64 hex chars for password reset.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate(purpose: Purpose) -> Result<String, AuthError> {
    match purpose {
        Purpose::VerifyEmail => {
            let mut bytes = [0u8; 4];
            fill_random(&mut bytes)?;
            let n = u32::from_be_bytes(bytes);
            Ok(format!("{:08}", 10_000_000 + n % 90_000_000))
        }
        Purpose::ResetPassword => {
            let mut bytes = [0u8; 32];
            fill_random(&mut bytes)?;
            Ok(hex::encode(bytes))
        }
    }
}

fn fill_random(bytes: &mut [u8]) -> Result<(), AuthError> {
    OsRng
        .try_fill_bytes(bytes)
        .map_err(|err| AuthError::Internal(format!("failed to generate token: {err}")))
}

pub struct ActionTokenManager {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    frontend_base_url: String,
}

impl ActionTokenManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        frontend_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            frontend_base_url: frontend_base_url.into(),
        }
    }

    /// Persists a new unused token for `account_id`.
    ///
    /// # Errors
    /// Returns an error if the store fails or secrets keep colliding.
    pub async fn create(
        &self,
        account_id: Uuid,
        email: &str,
        purpose: Purpose,
    ) -> Result<IssuedToken, AuthError> {
        for _ in 0..INSERT_ATTEMPTS {
            let secret = generate(purpose)?;
            let now = self.clock.now();
            let token = ActionToken {
                id: Uuid::now_v7(),
                account_id,
                email: email.to_string(),
                secret_hash: hash_secret(&secret),
                purpose,
                created_at: now,
                expires_at: now + purpose.ttl(),
                used: false,
                used_at: None,
            };

            match self.store.insert_action_token(&token).await {
                Ok(()) => return Ok(IssuedToken { token, secret }),
                // Another live token already holds this secret.
                Err(StoreError::Conflict) => {
                    debug!(purpose = purpose.as_str(), "action token collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AuthError::Internal(
            "failed to allocate a unique action token".to_string(),
        ))
    }

    /// Claims `secret` for `purpose` and returns the owning account.
    ///
    /// # Errors
    /// `TokenNotFound` if the token never existed, was used, expired, or its
    /// account no longer exists.
    #[instrument(skip(self, secret), fields(purpose = purpose.as_str()))]
    pub async fn redeem(&self, secret: &str, purpose: Purpose) -> Result<Account, AuthError> {
        let now = self.clock.now();
        let Some(token) = self
            .store
            .claim_action_token(&hash_secret(secret), purpose, now)
            .await?
        else {
            debug!("action token not redeemable");
            return Err(AuthError::TokenNotFound);
        };

        match self.store.find_account_by_id(token.account_id).await? {
            Some(account) => Ok(account),
            None => {
                warn!(account_id = %token.account_id, "action token claimed for missing account");
                Err(AuthError::TokenNotFound)
            }
        }
    }

    /// Creates a token and mails it. Delivery failures are logged and
    /// swallowed; only store failures are returned.
    ///
    /// # Errors
    /// Returns an error if the token cannot be created.
    pub async fn issue(&self, account: &Account, purpose: Purpose) -> Result<(), AuthError> {
        let issued = self.create(account.id, &account.email, purpose).await?;
        let message = match purpose {
            Purpose::VerifyEmail => email::verification_email(
                &account.email,
                &account.name,
                &issued.secret,
                &self.frontend_base_url,
            ),
            Purpose::ResetPassword => email::reset_password_email(
                &account.email,
                &account.name,
                &issued.secret,
                &self.frontend_base_url,
            ),
        };
        self.deliver(&message).await;
        info!(
            account_id = %account.id,
            purpose = purpose.as_str(),
            "action token issued"
        );
        Ok(())
    }

    /// Creation time of the newest token of `purpose` for the account.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn last_issued_at(
        &self,
        account_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        Ok(self.store.last_action_token_at(account_id, purpose).await?)
    }

    /// Best-effort delivery of a non-token email.
    pub async fn deliver(&self, message: &EmailMessage) {
        if let Err(err) = self.mailer.send(message).await {
            error!(subject = %message.subject, "failed to send email: {err:#}");
        }
    }
}
