//! secp256k1 ECDSA signing with public-key recovery.
//!
//! Provides the EVM account model used by the client: keypair generation,
//! 65-byte recoverable signatures over 32-byte prehashes, address
//! derivation, and signer recovery. The private key is zeroized on drop
//! by `k256`'s `SigningKey`.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use privid_types::{EvmAddress, PrivIdError, Result};
use rand::rngs::OsRng;

use crate::hash::keccak256;

/// Byte length of a recoverable signature (`r || s || v`).
pub const SIGNATURE_LEN: usize = 65;

// ---------------------------------------------------------------------------
// EvmKeypair
// ---------------------------------------------------------------------------

/// secp256k1 signing keypair for an EVM account.
pub struct EvmKeypair {
    signing_key: SigningKey,
}

impl EvmKeypair {
    /// Generates a new random keypair from OS entropy.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Reconstructs a keypair from a 32-byte secret scalar.
    ///
    /// # Errors
    ///
    /// Returns [`PrivIdError::CryptoError`] if the bytes are not a valid
    /// non-zero scalar below the curve order.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(secret).map_err(|e| PrivIdError::CryptoError {
            reason: format!("invalid secp256k1 secret key: {e}"),
        })?;
        Ok(Self { signing_key })
    }

    /// Returns the 32-byte secret scalar.
    ///
    /// The copy is sensitive; callers wrap it in a zeroizing container.
    pub fn secret_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Returns the SEC1 compressed public key (33 bytes).
    pub fn public_key_compressed(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Returns the EVM address of this keypair.
    pub fn address(&self) -> Result<EvmAddress> {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Signs a 32-byte prehash and returns `r || s || v` with `v` in
    /// the `27 | 28` wallet convention.
    ///
    /// # Errors
    ///
    /// Returns [`PrivIdError::CryptoError`] if signing fails.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<[u8; SIGNATURE_LEN]> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| PrivIdError::CryptoError {
                reason: format!("secp256k1 signing failed: {e}"),
            })?;
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recid.to_byte() + 27;
        Ok(out)
    }
}

// EvmKeypair does not implement Clone or Debug.

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Derives the EVM address of a verifying key:
/// the last 20 bytes of `keccak256(uncompressed_point[1..])`.
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] if the point does not encode to
/// the 65-byte uncompressed form.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Result<EvmAddress> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(PrivIdError::CryptoError {
            reason: "unexpected public key encoding".into(),
        });
    }
    let digest = keccak256(&pubkey[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Ok(EvmAddress::new(address))
}

/// Maps a wallet recovery byte (`0 | 1` or `27 | 28`) to a [`RecoveryId`].
fn normalize_recovery_id(raw: u8) -> Result<RecoveryId> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => {
            return Err(PrivIdError::CryptoError {
                reason: format!("recovery id must be 0/1 or 27/28, got {raw}"),
            })
        }
    };
    RecoveryId::try_from(id).map_err(|_| PrivIdError::CryptoError {
        reason: "recovery id is invalid".into(),
    })
}

/// Recovers the address that produced `signature` over `prehash`.
///
/// # Errors
///
/// Returns [`PrivIdError::CryptoError`] if the signature is malformed or
/// no key can be recovered.
pub fn recover_address(prehash: &[u8; 32], signature: &[u8]) -> Result<EvmAddress> {
    if signature.len() != SIGNATURE_LEN {
        return Err(PrivIdError::CryptoError {
            reason: format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                signature.len()
            ),
        });
    }
    let sig = EcdsaSignature::try_from(&signature[..64]).map_err(|e| PrivIdError::CryptoError {
        reason: format!("invalid ECDSA signature bytes: {e}"),
    })?;
    let recovery_id = normalize_recovery_id(signature[64])?;
    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id).map_err(|e| {
        PrivIdError::CryptoError {
            reason: format!("signer recovery failed: {e}"),
        }
    })?;
    address_from_verifying_key(&key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
