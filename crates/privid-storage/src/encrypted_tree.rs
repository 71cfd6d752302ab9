//! Typed sled tree with authenticated encryption of every value.
//!
//! Stored value layout (Encrypt-then-MAC):
//!
//! ```text
//! [nonce 24B] [ciphertext + poly1305 tag] [hmac 32B]
//! ```
//!
//! The HMAC covers `key || nonce || ciphertext`, and the record key is
//! also the AEAD associated data, so a value copied under another key
//! fails verification. The HMAC is checked before decryption.

use std::marker::PhantomData;
use std::sync::Arc;

use privid_crypto::{aead, mac};
use privid_types::{PrivIdError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::DerivedKeys;

/// Minimum stored value size: nonce + AEAD tag + HMAC.
const MIN_VALUE_LEN: usize = aead::NONCE_LEN + aead::TAG_LEN + mac::TAG_LEN;

/// A sled tree where every value is bincode-encoded, encrypted and
/// HMAC-authenticated.
pub struct EncryptedTree<T> {
    tree: sled::Tree,
    keys: Arc<DerivedKeys>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for EncryptedTree<T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            keys: Arc::clone(&self.keys),
            _marker: PhantomData,
        }
    }
}

impl<T> EncryptedTree<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(tree: sled::Tree, keys: Arc<DerivedKeys>) -> Self {
        Self {
            tree,
            keys,
            _marker: PhantomData,
        }
    }

    /// Retrieves and decrypts a value. Returns `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// [`PrivIdError::StorageError`] if the record is malformed, fails
    /// authentication, or does not decode.
    pub fn get(&self, key: &[u8]) -> Result<Option<T>> {
        let raw = self.tree.get(key).map_err(|e| PrivIdError::StorageError {
            reason: format!("sled get failed: {e}"),
        })?;
        raw.map(|bytes| self.open_value(key, &bytes)).transpose()
    }

    /// Encrypts and inserts a value, replacing any previous one.
    pub fn insert(&self, key: &[u8], value: &T) -> Result<()> {
        let sealed = self.seal_value(key, value)?;
        self.tree
            .insert(key, sealed)
            .map_err(|e| PrivIdError::StorageError {
                reason: format!("sled insert failed: {e}"),
            })?;
        Ok(())
    }

    /// Removes a key. Returns `true` if it existed.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        let prev = self.tree.remove(key).map_err(|e| PrivIdError::StorageError {
            reason: format!("sled remove failed: {e}"),
        })?;
        Ok(prev.is_some())
    }

    /// Returns every key without decrypting values.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (key, _) = item.map_err(|e| PrivIdError::StorageError {
                reason: format!("sled iter failed: {e}"),
            })?;
            out.push(key.to_vec());
        }
        Ok(out)
    }

    /// Flushes pending writes of this tree to disk.
    pub fn flush(&self) -> Result<()> {
        self.tree.flush().map_err(|e| PrivIdError::StorageError {
            reason: format!("sled flush failed: {e}"),
        })?;
        Ok(())
    }

    // -- Internal --------------------------------------------------------

    fn seal_value(&self, key: &[u8], value: &T) -> Result<Vec<u8>> {
        let plaintext = bincode::serialize(value).map_err(|e| PrivIdError::StorageError {
            reason: format!("bincode serialization failed: {e}"),
        })?;
        let mut record = aead::seal(&self.keys.enc_key, &plaintext, key)?;
        let tag = mac::tag(&self.keys.hmac_key, &[key, record.as_slice()])?;
        record.extend_from_slice(&tag);
        Ok(record)
    }

    fn open_value(&self, key: &[u8], raw: &[u8]) -> Result<T> {
        if raw.len() < MIN_VALUE_LEN {
            return Err(PrivIdError::StorageError {
                reason: format!(
                    "stored value too short: expected at least {MIN_VALUE_LEN} bytes, got {}",
                    raw.len()
                ),
            });
        }
        let (sealed, tag) = raw.split_at(raw.len() - mac::TAG_LEN);

        mac::verify(&self.keys.hmac_key, &[key, sealed], tag).map_err(|_| {
            PrivIdError::StorageError {
                reason: "HMAC verification failed: stored value may be tampered".into(),
            }
        })?;

        let plaintext = aead::open(&self.keys.enc_key, sealed, key)?;
        bincode::deserialize(&plaintext).map_err(|e| PrivIdError::StorageError {
            reason: format!("bincode deserialization failed: {e}"),
        })
    }
}
