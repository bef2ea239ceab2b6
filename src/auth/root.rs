//! Root API key check
//!
//! The root key is a single shared secret from configuration. There is no
//! store lookup, expiry or permission tier behind it.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare a presented key with the configured root key in constant time
///
/// Both sides are hashed first so the comparison always runs over 32 bytes,
/// independent of where the inputs differ or how long they are. Empty input
/// on either side never matches.
pub fn is_root_api_key(candidate: &str, root_key: &str) -> bool {
    if candidate.is_empty() || root_key.is_empty() {
        return false;
    }

    let candidate = Sha256::digest(candidate.as_bytes());
    let root_key = Sha256::digest(root_key.as_bytes());
    candidate.as_slice().ct_eq(root_key.as_slice()).into()
}

/// Holds the configured root key and checks presented keys against it
#[derive(Debug, Clone)]
pub struct RootKeyGate {
    root_key: SecretString,
}

impl RootKeyGate {
    pub fn new(root_key: SecretString) -> Self {
        Self { root_key }
    }

    /// Returns true only for an exact match with the configured key
    pub fn verify(&self, candidate: &str) -> bool {
        is_root_api_key(candidate, self.root_key.expose_secret())
    }

    /// Whether a root key is configured at all
    pub fn is_configured(&self) -> bool {
        !self.root_key.expose_secret().is_empty()
    }
}
