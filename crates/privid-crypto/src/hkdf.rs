//! HKDF-SHA256 derivation of storage subkeys.
//!
//! The grant store turns one caller-supplied master key into independent
//! encryption and MAC keys by varying the `info` label.

use hkdf::Hkdf;
use privid_types::{PrivIdError, Result};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte derived key, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// DerivedKey does not implement Clone or Debug.

/// Derives a 32-byte key from `ikm` with HKDF-SHA256.
///
/// An empty `salt` selects the RFC 5869 default (hash-length zeros).
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] if `ikm` is empty or expansion
/// fails.
pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<DerivedKey> {
    if ikm.is_empty() {
        return Err(PrivIdError::CryptoError {
            reason: "HKDF input keying material must not be empty".into(),
        });
    }
    let salt_opt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt_opt, ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| PrivIdError::CryptoError {
            reason: format!("HKDF-SHA256 expansion failed: {e}"),
        })?;
    Ok(DerivedKey(okm))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
