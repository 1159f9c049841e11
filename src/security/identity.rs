//! Peer identity derivation from TLS certificates
//!
//! Every certificate-authenticated connection is keyed by a stable,
//! privacy-preserving identifier: the base64 encoding of the first 20
//! bytes of the SHA-256 digest of the peer certificate. Usernames and
//! certificate hashes share one identity namespace but are distinguishable
//! by format.

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Bytes of the certificate digest kept in the identifier
const IDENTIFIER_BYTES: usize = 20;

/// Derive the identity of a peer from its certificate in binary form
///
/// Deterministic: the same certificate always yields the same identity.
#[must_use]
pub fn derive_identity(certificate: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(certificate);
    let hash = hasher.finalize();

    base64_encode(&hash[..IDENTIFIER_BYTES])
}

/// Check whether an identity string is a well-formed certificate hash
///
/// A hash identity base64-decodes to exactly 20 bytes. Usernames must
/// never satisfy this predicate; stores reject usernames that do, so the
/// two forms cannot collide.
#[must_use]
pub fn is_certificate_hash(identity: &str) -> bool {
    base64_decode(identity).is_ok_and(|bytes| bytes.len() == IDENTIFIER_BYTES)
}

/// Normalize a username for storage and comparison
///
/// # Errors
///
/// Returns [`Error::InvalidArgs`] for an empty name or one that collides
/// with the certificate-hash format.
pub fn normalize_username(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgs("empty username".to_string()));
    }

    let upper = name.trim().to_uppercase();
    if is_certificate_hash(&upper) {
        return Err(Error::InvalidArgs(format!(
            "username collides with certificate hash format: {upper}"
        )));
    }

    Ok(upper)
}

pub(crate) fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub(crate) fn base64_decode(data: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::InvalidArgs(format!("invalid base64: {e}")))
}
