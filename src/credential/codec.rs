use super::{CredentialError, EncodedCredential, PasswordParams};
use argon2::{Algorithm, Argon2, Version};
use base64ct::{Base64Unpadded, Encoding};
use rand::{RngCore, rngs::OsRng};

pub const ALGORITHM: &str = "argon2id";
pub const VERSION: u32 = 19;

/// Components recovered from an [`EncodedCredential`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedCredential {
    pub params: PasswordParams,
    pub salt: Vec<u8>,
    pub key: Vec<u8>,
}

/// Hashes `password` with a fresh random salt.
///
/// # Errors
/// Returns an error if the parameters are invalid or the OS RNG fails.
pub fn encode(
    password: &str,
    params: &PasswordParams,
) -> Result<EncodedCredential, CredentialError> {
    params.validate()?;
    let mut salt = vec![0u8; params.salt_len];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|_| CredentialError::Entropy)?;
    encode_with_salt(password, params, &salt)
}

/// Hashes `password` with the given salt. The salt length overrides
/// `params.salt_len`.
///
/// # Errors
/// Returns an error if Argon2 rejects the parameters or the salt.
pub fn encode_with_salt(
    password: &str,
    params: &PasswordParams,
    salt: &[u8],
) -> Result<EncodedCredential, CredentialError> {
    let key = derive_key(password.as_bytes(), salt, params)?;
    Ok(EncodedCredential::new(format!(
        "${ALGORITHM}$v={VERSION}$m={},t={},p={}${}${}",
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Base64Unpadded::encode_string(salt),
        Base64Unpadded::encode_string(&key),
    )))
}

/// Parses an encoded credential.
///
/// # Errors
/// `Malformed` for structural problems, `UnsupportedVersion` for any version
/// other than 19.
pub fn decode(encoded: &EncodedCredential) -> Result<DecodedCredential, CredentialError> {
    let fields: Vec<&str> = encoded.as_str().split('$').collect();
    let [leading, algorithm, version, costs, salt, key] = fields.as_slice() else {
        return Err(CredentialError::Malformed("expected five fields"));
    };

    if !leading.is_empty() {
        return Err(CredentialError::Malformed("missing leading delimiter"));
    }

    if *algorithm != ALGORITHM {
        return Err(CredentialError::Malformed("unknown algorithm"));
    }

    let version = version
        .strip_prefix("v=")
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or(CredentialError::Malformed("version segment"))?;
    if version != VERSION {
        return Err(CredentialError::UnsupportedVersion(version));
    }

    let (memory_kib, iterations, parallelism) = parse_costs(costs)?;

    let salt =
        Base64Unpadded::decode_vec(salt).map_err(|_| CredentialError::Malformed("salt encoding"))?;
    let key =
        Base64Unpadded::decode_vec(key).map_err(|_| CredentialError::Malformed("key encoding"))?;
    if salt.is_empty() || key.is_empty() {
        return Err(CredentialError::Malformed("empty salt or key"));
    }

    Ok(DecodedCredential {
        params: PasswordParams {
            memory_kib,
            iterations,
            parallelism,
            salt_len: salt.len(),
            key_len: key.len(),
        },
        salt,
        key,
    })
}

pub(crate) fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &PasswordParams,
) -> Result<Vec<u8>, CredentialError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut key = vec![0u8; params.key_len];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|err| CredentialError::Derivation(err.to_string()))?;
    Ok(key)
}

fn parse_costs(segment: &str) -> Result<(u32, u32, u32), CredentialError> {
    let mut memory = None;
    let mut iterations = None;
    let mut parallelism = None;

    for pair in segment.split(',') {
        let (name, value) = pair
            .split_once('=')
            .ok_or(CredentialError::Malformed("cost segment"))?;
        let value = value
            .parse::<u32>()
            .map_err(|_| CredentialError::Malformed("cost value"))?;
        let slot = match name {
            "m" => &mut memory,
            "t" => &mut iterations,
            "p" => &mut parallelism,
            _ => return Err(CredentialError::Malformed("unknown cost")),
        };
        if slot.replace(value).is_some() {
            return Err(CredentialError::Malformed("duplicate cost"));
        }
    }

    match (memory, iterations, parallelism) {
        (Some(m), Some(t), Some(p)) => Ok((m, t, p)),
        _ => Err(CredentialError::Malformed("missing cost")),
    }
}
