//! Process-wide auth configuration, validated once at start.

use crate::{
    credential::{CredentialError, PasswordParams},
    lockout::{DEFAULT_LOCK_MINUTES, DEFAULT_THRESHOLD, MAX_LOCK_MINUTES},
    session::{DEFAULT_AUDIENCE, DEFAULT_ISSUER, SessionError, SigningSecret},
    store::DEFAULT_STORE_TIMEOUT,
};
use secrecy::SecretString;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
/// One day.
pub const MAX_RESEND_COOLDOWN_SECONDS: i64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Secret(#[from] SessionError),
    #[error(transparent)]
    Params(#[from] CredentialError),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    signing_secret: SigningSecret,
    issuer: String,
    audience: String,
    frontend_base_url: String,
    password_params: PasswordParams,
    store_timeout: Duration,
    resend_cooldown_seconds: i64,
    lockout_threshold: u32,
    lockout_minutes: i64,
}

impl AuthConfig {
    /// # Errors
    /// Returns an error if the signing secret is shorter than 32 bytes.
    pub fn new(signing_secret: SecretString) -> Result<Self, ConfigError> {
        Ok(Self {
            signing_secret: SigningSecret::new(signing_secret)?,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            password_params: PasswordParams::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            lockout_threshold: DEFAULT_THRESHOLD,
            lockout_minutes: DEFAULT_LOCK_MINUTES,
        })
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, frontend_base_url: String) -> Self {
        self.frontend_base_url = frontend_base_url;
        self
    }

    /// # Errors
    /// Returns an error if Argon2 would reject the parameters.
    pub fn with_password_params(mut self, params: PasswordParams) -> Result<Self, ConfigError> {
        params.validate()?;
        self.password_params = params;
        Ok(self)
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds.clamp(0, MAX_RESEND_COOLDOWN_SECONDS);
        self
    }

    /// Threshold and lock length are clamped to `1..` and `1..=MAX_LOCK_MINUTES`.
    #[must_use]
    pub fn with_lockout(mut self, threshold: u32, minutes: i64) -> Self {
        self.lockout_threshold = threshold.max(1);
        self.lockout_minutes = minutes.clamp(1, MAX_LOCK_MINUTES);
        self
    }

    #[must_use]
    pub fn signing_secret(&self) -> &SigningSecret {
        &self.signing_secret
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn password_params(&self) -> &PasswordParams {
        &self.password_params
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn lockout_threshold(&self) -> u32 {
        self.lockout_threshold
    }

    #[must_use]
    pub fn lockout_minutes(&self) -> i64 {
        self.lockout_minutes
    }
}
