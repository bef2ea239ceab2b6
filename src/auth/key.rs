//! API key generation and shape validation
//!
//! Keys look like `orbitkey_<url-safe base64, unpadded>`. The prefix is a
//! cheap pre-filter: anything without it is rejected before a store lookup.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// Prefix carried by every issued key
pub const KEY_PREFIX: &str = "orbitkey_";

/// Random bytes drawn for a key when no valid length is requested
pub const DEFAULT_KEY_LENGTH: usize = 32;

/// Requests below this many bytes fall back to [`DEFAULT_KEY_LENGTH`]
pub const MIN_KEY_LENGTH: usize = 16;

/// Minimum characters after the prefix for a key to be well-formed
pub const MIN_TRIMMED_KEY_LENGTH: usize = 22;

/// Key generation errors
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("failed to generate secure random bytes: {0}")]
    Entropy(#[from] rand::Error),
}

/// Generate a new API key from the operating system CSPRNG
pub fn generate_api_key(length: usize) -> Result<String, KeyError> {
    generate_api_key_with(&mut OsRng, length)
}

/// Generate a new API key from the given CSPRNG
///
/// Lengths below [`MIN_KEY_LENGTH`] are replaced by [`DEFAULT_KEY_LENGTH`].
/// If the source cannot fill the whole buffer the call fails; the key is
/// never truncated or padded.
pub fn generate_api_key_with<R>(rng: &mut R, length: usize) -> Result<String, KeyError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let length = if length < MIN_KEY_LENGTH {
        DEFAULT_KEY_LENGTH
    } else {
        length
    };

    let mut bytes = vec![0u8; length];
    rng.try_fill_bytes(&mut bytes)?;

    Ok(format!("{}{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(&bytes)))
}

/// Check that a string has the shape of an issued key
///
/// This does not prove the key exists; it only rejects empty, foreign,
/// short or non-base64url input before any lookup happens.
pub fn validate_api_key(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }

    let Some(rest) = key.strip_prefix(KEY_PREFIX) else {
        return false;
    };

    rest.len() >= MIN_TRIMMED_KEY_LENGTH
        && rest
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
