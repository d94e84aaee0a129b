//! Registration, email verification and password reset flows.
//!
//! `resend_verification` and `forgot_password` always report success so the
//! response never reveals whether an email is registered.

use crate::{
    action_token::{ActionTokenManager, Purpose},
    clock::Clock,
    credential::{self, CredentialVerifier},
    email,
    error::AuthError,
    store::{Account, Store, StoreError},
    validation::{
        normalize_email, sanitize_input, valid_email, valid_verification_code, validate_password,
    },
};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 100;

/// Account summary returned by registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

pub struct AccountService {
    store: Arc<dyn Store>,
    verifier: Arc<dyn CredentialVerifier>,
    tokens: Arc<ActionTokenManager>,
    clock: Arc<dyn Clock>,
    resend_cooldown: Duration,
}

impl AccountService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        verifier: Arc<dyn CredentialVerifier>,
        tokens: Arc<ActionTokenManager>,
        clock: Arc<dyn Clock>,
        resend_cooldown: Duration,
    ) -> Self {
        Self {
            store,
            verifier,
            tokens,
            clock,
            resend_cooldown,
        }
    }

    /// Creates an unverified account and mails its verification code.
    ///
    /// # Errors
    /// `MalformedInput` for invalid input, `RegistrationFailed` when the email
    /// is taken, and store or hashing faults.
    #[instrument(skip(self, password, name))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<RegisteredAccount, AuthError> {
        let email = normalize_email(email);
        let name = sanitize_input(name);

        if !valid_email(&email) {
            return Err(AuthError::MalformedInput("Invalid email format".to_string()));
        }
        if name.is_empty() {
            return Err(AuthError::MalformedInput("Name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AuthError::MalformedInput(format!(
                "Name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        validate_password(password).map_err(|msg| AuthError::MalformedInput(msg.to_string()))?;

        let credential = credential::hash_password(&self.verifier, password).await?;
        let account = Account::new(email, name, credential, self.clock.now());

        match self.store.insert_account(&account).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                debug!("registration rejected, email already registered");
                return Err(AuthError::RegistrationFailed {
                    detail: "email already registered",
                });
            }
            Err(err) => return Err(err.into()),
        }

        // The account is committed; a failed token must not turn into a 500 for
        // an email that is now taken. resend-verification recovers it.
        if let Err(err) = self.tokens.issue(&account, Purpose::VerifyEmail).await {
            warn!(
                account_id = %account.id,
                "account registered without a verification code: {err}"
            );
        }
        info!(account_id = %account.id, "account registered");

        Ok(RegisteredAccount {
            id: account.id,
            email: account.email,
            name: account.name,
        })
    }

    /// Redeems an 8-digit verification code and marks the account verified.
    ///
    /// # Errors
    /// `MalformedInput` for a badly shaped code, `TokenNotFound` when it cannot
    /// be redeemed.
    #[instrument(skip(self, code))]
    pub async fn verify_email(&self, code: &str) -> Result<Account, AuthError> {
        let code = sanitize_input(code);
        if !valid_verification_code(&code) {
            return Err(AuthError::MalformedInput(
                "Verification code must be 8 digits".to_string(),
            ));
        }

        let account = self.tokens.redeem(&code, Purpose::VerifyEmail).await?;
        if account.verified {
            debug!(account_id = %account.id, "email already verified");
            return Ok(account);
        }

        let now = self.clock.now();
        self.store.mark_verified(account.id, now).await?;
        self.tokens
            .deliver(&email::welcome_email(&account.email, &account.name))
            .await;
        info!(account_id = %account.id, "email verified");

        Ok(Account {
            verified: true,
            verified_at: Some(now),
            ..account
        })
    }

    /// Issues a fresh verification code for an unverified account.
    ///
    /// # Errors
    /// Only store faults; every other case reports success.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            debug!("resend ignored, invalid email");
            return Ok(());
        }

        let Some(account) = self.store.find_account_by_email(&email).await? else {
            debug!("resend ignored, unknown email");
            return Ok(());
        };
        if account.verified {
            debug!(account_id = %account.id, "resend ignored, already verified");
            return Ok(());
        }

        if let Some(last) = self
            .tokens
            .last_issued_at(account.id, Purpose::VerifyEmail)
            .await?
        {
            if self.clock.now() < last + self.resend_cooldown {
                debug!(account_id = %account.id, "resend ignored, cooldown active");
                return Ok(());
            }
        }

        self.tokens.issue(&account, Purpose::VerifyEmail).await
    }

    /// Issues a reset token for a verified account.
    ///
    /// # Errors
    /// Only store faults; every other case reports success.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            debug!("reset ignored, invalid email");
            return Ok(());
        }

        let Some(account) = self.store.find_account_by_email(&email).await? else {
            debug!("reset ignored, unknown email");
            return Ok(());
        };
        if !account.verified {
            debug!(account_id = %account.id, "reset ignored, email not verified");
            return Ok(());
        }

        self.tokens.issue(&account, Purpose::ResetPassword).await
    }

    /// Redeems a reset token and replaces the password. Clears any lockout.
    ///
    /// # Errors
    /// `MalformedInput` for a weak password (checked before the token is
    /// spent), `TokenNotFound` when the token cannot be redeemed.
    #[instrument(skip(self, secret, new_password))]
    pub async fn reset_password(&self, secret: &str, new_password: &str) -> Result<(), AuthError> {
        let secret = sanitize_input(secret);
        if secret.is_empty() {
            return Err(AuthError::MalformedInput("Reset token is required".to_string()));
        }
        validate_password(new_password)
            .map_err(|msg| AuthError::MalformedInput(msg.to_string()))?;

        let account = self.tokens.redeem(&secret, Purpose::ResetPassword).await?;
        let credential = credential::hash_password(&self.verifier, new_password).await?;
        self.store
            .reset_credential(account.id, &credential, self.clock.now())
            .await?;

        self.tokens
            .deliver(&email::password_changed_email(&account.email, &account.name))
            .await;
        info!(account_id = %account.id, "password reset");
        Ok(())
    }
}
