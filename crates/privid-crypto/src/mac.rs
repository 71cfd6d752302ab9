//! HMAC-SHA256 tags for stored records.
//!
//! The grant store authenticates each sealed record before attempting to
//! open it (Encrypt-then-MAC), so tampering is reported without touching
//! the cipher.

use hmac::{Hmac, Mac};
use privid_types::{PrivIdError, Result};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Byte length of an HMAC-SHA256 tag.
pub const TAG_LEN: usize = 32;

fn keyed(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| PrivIdError::CryptoError {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })
}

/// Computes HMAC-SHA256 over the concatenation of `parts`.
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] if the key is rejected.
pub fn tag(key: &[u8], parts: &[&[u8]]) -> Result<[u8; TAG_LEN]> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Verifies a tag produced by [`tag`] in constant time.
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] on mismatch (possible tampering).
pub fn verify(key: &[u8], parts: &[&[u8]], expected: &[u8]) -> Result<()> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(expected)
        .map_err(|_| PrivIdError::CryptoError {
            reason: "HMAC-SHA256 tag mismatch (possible tampering)".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
