use super::{
    CredentialError, EncodedCredential, PasswordParams,
    codec::{decode, derive_key, encode},
};

/// Password hashing seam used by the login and account flows.
pub trait CredentialVerifier: Send + Sync {
    /// # Errors
    /// Returns an error if the stored credential cannot be decoded.
    fn verify(&self, password: &str, encoded: &EncodedCredential) -> Result<bool, CredentialError>;

    /// # Errors
    /// Returns an error if the stored credential cannot be decoded.
    fn needs_rehash(&self, encoded: &EncodedCredential) -> Result<bool, CredentialError>;

    /// # Errors
    /// Returns an error if hashing fails.
    fn hash(&self, password: &str) -> Result<EncodedCredential, CredentialError>;
}

/// Argon2id verifier bound to the current [`PasswordParams`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2Verifier {
    current: PasswordParams,
}

impl Argon2Verifier {
    #[must_use]
    pub fn new(current: PasswordParams) -> Self {
        Self { current }
    }

    #[must_use]
    pub fn current(&self) -> &PasswordParams {
        &self.current
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, password: &str, encoded: &EncodedCredential) -> Result<bool, CredentialError> {
        verify(password, encoded)
    }

    fn needs_rehash(&self, encoded: &EncodedCredential) -> Result<bool, CredentialError> {
        needs_rehash(encoded, &self.current)
    }

    fn hash(&self, password: &str) -> Result<EncodedCredential, CredentialError> {
        encode(password, &self.current)
    }
}

/// Re-derives the key with the stored parameters and compares in fixed time.
///
/// # Errors
/// A credential that cannot be decoded is an error, never `false`.
pub fn verify(password: &str, encoded: &EncodedCredential) -> Result<bool, CredentialError> {
    let decoded = decode(encoded)?;
    let candidate = derive_key(password.as_bytes(), &decoded.salt, &decoded.params)?;
    Ok(fixed_time_eq(&candidate, &decoded.key))
}

/// True iff the stored memory, time or parallelism cost differs from `current`.
///
/// # Errors
/// Returns an error if the stored credential cannot be decoded.
pub fn needs_rehash(
    encoded: &EncodedCredential,
    current: &PasswordParams,
) -> Result<bool, CredentialError> {
    Ok(!decode(encoded)?.params.same_cost(current))
}

#[must_use]
pub fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    compare_all(a, b).0
}

// Scans max(len) positions unconditionally; the second value is the number of
// positions inspected.
fn compare_all(a: &[u8], b: &[u8]) -> (bool, usize) {
    let len = a.len().max(b.len());
    let mut diff = u8::from(a.len() != b.len());
    let mut inspected = 0;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
        inspected += 1;
    }
    (std::hint::black_box(diff) == 0, inspected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{encode_with_salt, test_support::cheap_params};
    use rand::{Rng, distributions::Alphanumeric, thread_rng};

    fn random_password(len: usize) -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    #[test]
    fn verify_accepts_matching_password() -> Result<(), CredentialError> {
        let encoded = encode("Correct-Horse-Battery-9", &cheap_params())?;
        assert!(verify("Correct-Horse-Battery-9", &encoded)?);
        Ok(())
    }

    #[test]
    fn verify_accepts_unicode_and_empty_passwords() -> Result<(), CredentialError> {
        for password in ["", "pässwörd-ünïcødé-🔐", " leading and trailing "] {
            let encoded = encode(password, &cheap_params())?;
            assert!(verify(password, &encoded)?, "{password:?} should verify");
        }
        Ok(())
    }

    #[test]
    fn verify_has_no_false_positives() -> Result<(), CredentialError> {
        let params = cheap_params();
        let salt = [7u8; 16];
        for _ in 0..10_000 {
            let first = random_password(16);
            let mut second = random_password(16);
            while second == first {
                second = random_password(16);
            }
            let encoded = encode_with_salt(&first, &params, &salt)?;
            assert!(!verify(&second, &encoded)?, "{second} matched {first}");
        }
        Ok(())
    }

    #[test]
    fn verify_uses_stored_params_not_current() -> Result<(), CredentialError> {
        let legacy = PasswordParams::new(16, 2, 1);
        let encoded = encode("Correct-Horse-Battery-9", &legacy)?;
        let verifier = Argon2Verifier::new(cheap_params());
        assert!(verifier.verify("Correct-Horse-Battery-9", &encoded)?);
        assert!(verifier.needs_rehash(&encoded)?);
        Ok(())
    }

    #[test]
    fn verify_reports_corrupt_credentials() {
        let encoded = EncodedCredential::new("not-a-credential");
        assert!(verify("anything", &encoded).is_err());
    }

    #[test]
    fn needs_rehash_only_on_cost_change() -> Result<(), CredentialError> {
        let current = cheap_params();
        let encoded = encode("Correct-Horse-Battery-9", &current)?;
        assert!(!needs_rehash(&encoded, &current)?);
        assert!(!needs_rehash(&encoded, &current.with_key_len(64))?);
        assert!(needs_rehash(&encoded, &PasswordParams::new(16, 1, 1))?);
        assert!(needs_rehash(&encoded, &PasswordParams::new(8, 2, 1))?);
        assert!(needs_rehash(&encoded, &PasswordParams::new(16, 1, 2))?);
        Ok(())
    }

    #[test]
    fn fixed_time_eq_scans_full_length() {
        let reference = [0xAAu8; 32];

        let mut first = reference;
        first[0] ^= 0xFF;
        let mut last = reference;
        last[31] ^= 0xFF;

        assert_eq!(compare_all(&reference, &reference), (true, 32));
        assert_eq!(compare_all(&first, &reference), (false, 32));
        assert_eq!(compare_all(&last, &reference), (false, 32));
    }

    #[test]
    fn fixed_time_eq_rejects_length_mismatch() {
        assert!(!fixed_time_eq(b"abc", b"abcd"));
        assert!(!fixed_time_eq(b"", b"\0"));
        assert_eq!(compare_all(b"abc", b"abcd").1, 4);
        assert!(fixed_time_eq(b"", b""));
    }
}
