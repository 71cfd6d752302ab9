//! XChaCha20-Poly1305 sealing for records at rest.
//!
//! A sealed record is laid out as `[nonce (24)][ciphertext + tag]`. Nonces
//! come from OS entropy; the 192-bit space makes random nonces safe for
//! the lifetime of a key.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use privid_types::{PrivIdError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// Byte length of an XChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 24;

/// Byte length of the Poly1305 tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Generates a fresh random nonce.
fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Encrypts `plaintext` under `key`, binding `aad`, and returns the
/// sealed `[nonce][ciphertext + tag]` buffer.
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] if the cipher rejects the input.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    seal_with_nonce(key, &generate_nonce(), plaintext, aad)
}

/// Like [`seal`] with a caller-chosen nonce. Only for deterministic tests
/// and known-answer checks.
pub fn seal_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| PrivIdError::CryptoError {
            reason: format!("XChaCha20-Poly1305 encryption failed: {e}"),
        })?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Opens a buffer produced by [`seal`].
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] if the buffer is too short or the
/// tag does not verify (wrong key, wrong AAD, or tampering).
pub fn open(key: &[u8; 32], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(PrivIdError::CryptoError {
            reason: format!(
                "sealed record too short: {} bytes, minimum {}",
                sealed.len(),
                NONCE_LEN + TAG_LEN
            ),
        });
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|e| PrivIdError::CryptoError {
            reason: format!("XChaCha20-Poly1305 decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() -> std::result::Result<(), PrivIdError> {
        let key = [0x42u8; 32];
        let sealed = seal(&key, b"grant record", b"grants")?;
        assert_eq!(sealed.len(), NONCE_LEN + 12 + TAG_LEN);
        assert_eq!(open(&key, &sealed, b"grants")?, b"grant record");
        Ok(())
    }

    #[test]
    fn wrong_key_fails() -> std::result::Result<(), PrivIdError> {
        let sealed = seal(&[0x01; 32], b"secret", b"")?;
        assert!(open(&[0x02; 32], &sealed, b"").is_err());
        Ok(())
    }

    #[test]
    fn wrong_aad_fails() -> std::result::Result<(), PrivIdError> {
        let key = [0x42u8; 32];
        let sealed = seal(&key, b"secret", b"key-a")?;
        assert!(open(&key, &sealed, b"key-b").is_err());
        Ok(())
    }

    #[test]
    fn tampered_ciphertext_fails() -> std::result::Result<(), PrivIdError> {
        let key = [0x42u8; 32];
        let mut sealed = seal(&key, b"secret", b"")?;
        if let Some(byte) = sealed.last_mut() {
            *byte ^= 0xFF;
        }
        assert!(open(&key, &sealed, b"").is_err());
        Ok(())
    }

    #[test]
    fn truncated_buffer_rejected() {
        assert!(open(&[0x42; 32], &[0u8; NONCE_LEN + TAG_LEN - 1], b"").is_err());
    }

    #[test]
    fn fixed_nonce_is_deterministic() -> std::result::Result<(), PrivIdError> {
        let key = [0xAA; 32];
        let nonce = [0xBB; NONCE_LEN];
        assert_eq!(
            seal_with_nonce(&key, &nonce, b"same", b"")?,
            seal_with_nonce(&key, &nonce, b"same", b"")?
        );
        Ok(())
    }

    #[test]
    fn random_nonces_differ() -> std::result::Result<(), PrivIdError> {
        let key = [0x42u8; 32];
        assert_ne!(seal(&key, b"x", b"")?, seal(&key, b"x", b"")?);
        Ok(())
    }
}
