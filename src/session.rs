//! Session tokens.
//!
//! Sessions are HS512 JWTs in compact form. They are not persisted and cannot
//! be revoked; validity ends at `exp`.

use crate::clock::Clock;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Duration;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::{fmt, sync::Arc};
use thiserror::Error;
use ulid::Ulid;
use uuid::Uuid;

type HmacSha512 = Hmac<Sha512>;

pub const MIN_SECRET_LEN: usize = 32;
pub const SESSION_TTL_HOURS: i64 = 24;
pub const DEFAULT_ISSUER: &str = "gatehouse";
pub const DEFAULT_AUDIENCE: &str = "gatehouse-users";

const ISSUED_ALG: &str = "HS512";
const HMAC_FAMILY: [&str; 3] = ["HS256", "HS384", "HS512"];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),
    #[error("malformed token")]
    Malformed,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unexpected signing algorithm: {0}")]
    UnexpectedAlgorithm(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid claims: {0}")]
    InvalidClaims(&'static str),
}

/// HMAC key, validated for length on construction.
#[derive(Clone)]
pub struct SigningSecret(SecretString);

impl SigningSecret {
    /// # Errors
    /// Returns `WeakSecret` if the secret is shorter than 32 bytes.
    pub fn new(secret: SecretString) -> Result<Self, SessionError> {
        let len = secret.expose_secret().len();
        if len < MIN_SECRET_LEN {
            return Err(SessionError::WeakSecret(len));
        }
        Ok(Self(secret))
    }

    fn mac(&self) -> Result<HmacSha512, SessionError> {
        // HMAC accepts keys of any length; this never fails in practice.
        HmacSha512::new_from_slice(self.0.expose_secret().as_bytes())
            .map_err(|_| SessionError::WeakSecret(0))
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionHeader {
    pub alg: String,
    #[serde(default)]
    pub typ: String,
}

impl SessionHeader {
    fn hs512() -> Self {
        Self {
            alg: ISSUED_ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, SessionError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, SessionError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| SessionError::Malformed)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub struct SessionIssuer {
    secret: SigningSecret,
    issuer: String,
    audience: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(
        secret: SigningSecret,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl: Duration::hours(SESSION_TTL_HOURS),
            clock,
        }
    }

    /// Signs a fresh session for `account_id`.
    ///
    /// # Errors
    /// Returns an error if the header or claims cannot be serialised.
    pub fn issue(&self, account_id: Uuid) -> Result<String, SessionError> {
        let iat = self.clock.now().timestamp();
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat,
            exp: iat + self.ttl.num_seconds(),
            jti: Ulid::new().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let header_b64 = b64e_json(&SessionHeader::hs512())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.secret.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Validates `token` and returns the account id it was issued for.
    ///
    /// # Errors
    /// See [`SessionIssuer::verify`].
    pub fn validate(&self, token: &str) -> Result<Uuid, SessionError> {
        let claims = self.verify(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| SessionError::InvalidClaims("sub"))
    }

    /// Checks, in order: structure, algorithm, signature, expiry, issued-at,
    /// issuer and audience.
    ///
    /// # Errors
    /// Returns the first check that fails.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };

        let header: SessionHeader = b64d_json(header_b64)?;
        if !HMAC_FAMILY.contains(&header.alg.as_str()) {
            return Err(SessionError::UnexpectedAlgorithm(header.alg));
        }

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| SessionError::Malformed)?;
        let mut mac = self.secret.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        let now = self.clock.now().timestamp();
        if now >= claims.exp {
            return Err(SessionError::Expired);
        }
        if now < claims.iat {
            return Err(SessionError::NotYetValid);
        }
        if claims.iss != self.issuer {
            return Err(SessionError::InvalidClaims("iss"));
        }
        if claims.aud != self.audience {
            return Err(SessionError::InvalidClaims("aud"));
        }

        Ok(claims)
    }
}
