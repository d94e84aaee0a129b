//! Password credentials.
//!
//! A credential is an Argon2id derived key serialised together with the cost
//! parameters and salt that produced it:
//!
//! ```text
//! $argon2id$v=19$m=65536,t=10,p=1$<b64 salt>$<b64 key>
//! ```
//!
//! Because every credential carries its own parameters, raising the policy
//! never invalidates existing hashes; [`needs_rehash`] reports when a stored
//! credential should be upgraded.

mod codec;
mod verifier;

pub use codec::{ALGORITHM, DecodedCredential, VERSION, decode, encode, encode_with_salt};
pub use verifier::{Argon2Verifier, CredentialVerifier, fixed_time_eq, needs_rehash, verify};

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 10;
pub const DEFAULT_PARALLELISM: u32 = 1;
pub const DEFAULT_SALT_LEN: usize = 16;
pub const DEFAULT_KEY_LEN: usize = 32;

/// Argon2 enforces an 8 byte minimum salt.
pub const MIN_SALT_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed credential: {0}")]
    Malformed(&'static str),
    #[error("unsupported credential version: {0}")]
    UnsupportedVersion(u32),
    #[error("invalid password parameters: {0}")]
    InvalidParams(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("failed to generate salt")]
    Entropy,
}

/// Argon2id cost policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt_len: usize,
    pub key_len: usize,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
            salt_len: DEFAULT_SALT_LEN,
            key_len: DEFAULT_KEY_LEN,
        }
    }
}

impl PasswordParams {
    #[must_use]
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_salt_len(mut self, salt_len: usize) -> Self {
        self.salt_len = salt_len;
        self
    }

    #[must_use]
    pub fn with_key_len(mut self, key_len: usize) -> Self {
        self.key_len = key_len;
        self
    }

    /// True when both describe the same work factor. Salt and key lengths are
    /// not cost parameters.
    #[must_use]
    pub fn same_cost(&self, other: &Self) -> bool {
        self.memory_kib == other.memory_kib
            && self.iterations == other.iterations
            && self.parallelism == other.parallelism
    }

    /// Checks the parameters against the Argon2 limits.
    ///
    /// # Errors
    /// Returns `InvalidParams` when Argon2 would reject them.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.salt_len < MIN_SALT_LEN {
            return Err(CredentialError::InvalidParams(format!(
                "salt length must be at least {MIN_SALT_LEN} bytes"
            )));
        }
        self.to_argon2().map(|_| ())
    }

    pub(crate) fn to_argon2(self) -> Result<argon2::Params, CredentialError> {
        argon2::Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.key_len),
        )
        .map_err(|err| CredentialError::InvalidParams(err.to_string()))
    }
}

/// Serialised credential as persisted by the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedCredential(String);

impl EncodedCredential {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EncodedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Salt and key are sensitive enough to keep out of debug logs.
impl fmt::Debug for EncodedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncodedCredential(..)")
    }
}

/// Hashes `password` on the blocking pool.
///
/// # Errors
/// Returns `AuthError::Credential` when derivation fails and `AuthError::Internal`
/// when the blocking task panics.
pub async fn hash_password(
    verifier: &Arc<dyn CredentialVerifier>,
    password: &str,
) -> Result<EncodedCredential, AuthError> {
    let verifier = Arc::clone(verifier);
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || verifier.hash(&password))
        .await
        .map_err(|err| AuthError::Internal(format!("hash task failed: {err}")))?
        .map_err(AuthError::from)
}

/// Verifies `password` against `encoded` on the blocking pool.
///
/// # Errors
/// Returns `AuthError::Credential` when the stored credential cannot be decoded.
pub async fn verify_password(
    verifier: &Arc<dyn CredentialVerifier>,
    password: &str,
    encoded: &EncodedCredential,
) -> Result<bool, AuthError> {
    let verifier = Arc::clone(verifier);
    let password = password.to_owned();
    let encoded = encoded.clone();
    tokio::task::spawn_blocking(move || verifier.verify(&password, &encoded))
        .await
        .map_err(|err| AuthError::Internal(format!("verify task failed: {err}")))?
        .map_err(AuthError::from)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_policy() {
        let params = PasswordParams::default();
        assert_eq!(params.memory_kib, 65_536);
        assert_eq!(params.iterations, 10);
        assert_eq!(params.parallelism, 1);
        assert_eq!(params.salt_len, 16);
        assert_eq!(params.key_len, 32);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_salt() {
        let params = PasswordParams::default().with_salt_len(4);
        assert!(matches!(
            params.validate(),
            Err(CredentialError::InvalidParams(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_iterations() {
        let params = PasswordParams::new(65_536, 0, 1);
        assert!(params.validate().is_err());
    }

    #[test]
    fn same_cost_ignores_lengths() {
        let a = PasswordParams::default();
        let b = PasswordParams::default().with_salt_len(32).with_key_len(64);
        assert!(a.same_cost(&b));
        assert!(!a.same_cost(&PasswordParams::new(65_536, 3, 1)));
    }

    #[test]
    fn encoded_credential_debug_is_redacted() {
        let encoded = EncodedCredential::new("$argon2id$v=19$m=8,t=1,p=1$c2FsdA$a2V5");
        assert_eq!(format!("{encoded:?}"), "EncodedCredential(..)");
    }

    #[tokio::test]
    async fn hash_and_verify_on_blocking_pool() -> anyhow::Result<()> {
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(Argon2Verifier::new(test_support::cheap_params()));
        let encoded = hash_password(&verifier, "Correct-Horse-Battery-9").await?;
        assert!(verify_password(&verifier, "Correct-Horse-Battery-9", &encoded).await?);
        assert!(!verify_password(&verifier, "Correct-Horse-Battery-8", &encoded).await?);
        Ok(())
    }
}
