//! Storage engine: database lifecycle and key management.
//!
//! The [`StorageEngine`] owns the sled database and the keys derived from
//! the caller's master key. Derived keys are zeroized on drop.

use std::path::Path;
use std::sync::Arc;

use privid_crypto::hkdf::derive_key;
use privid_types::{PrivIdError, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encrypted_tree::EncryptedTree;
use crate::grants::DurableGrantStore;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Required master key length in bytes.
pub const KEY_LEN: usize = 32;

const HKDF_SALT: &[u8] = b"PrivID-Storage-v1";
const HKDF_INFO_ENC: &[u8] = b"encryption";
const HKDF_INFO_HMAC: &[u8] = b"hmac";

/// Name of the sled tree holding decryption grants.
pub const GRANTS_TREE: &str = "grants";

// ---------------------------------------------------------------------------
// DerivedKeys
// ---------------------------------------------------------------------------

/// Domain-separated subkeys derived from the master key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct DerivedKeys {
    pub enc_key: [u8; 32],
    pub hmac_key: [u8; 32],
}

impl DerivedKeys {
    fn derive(master_key: &[u8]) -> Result<Self> {
        let enc = derive_key(master_key, HKDF_SALT, HKDF_INFO_ENC)?;
        let hmac = derive_key(master_key, HKDF_SALT, HKDF_INFO_HMAC)?;
        Ok(Self {
            enc_key: *enc.as_bytes(),
            hmac_key: *hmac.as_bytes(),
        })
    }
}

// ---------------------------------------------------------------------------
// StorageEngine
// ---------------------------------------------------------------------------

/// Encrypted storage engine backed by sled.
///
/// Values written through the engine's trees are encrypted with
/// XChaCha20-Poly1305 and authenticated with HMAC-SHA256. The master key
/// is supplied by the caller; the engine never generates keys itself.
pub struct StorageEngine {
    db: sled::Db,
    keys: Arc<DerivedKeys>,
}

impl StorageEngine {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// - [`PrivIdError::ConfigError`] if `master_key` is not exactly
    ///   [`KEY_LEN`] bytes.
    /// - [`PrivIdError::StorageError`] if the database cannot be opened.
    pub fn open(path: &Path, master_key: &[u8]) -> Result<Self> {
        if master_key.len() != KEY_LEN {
            return Err(PrivIdError::ConfigError {
                reason: format!(
                    "storage key must be {KEY_LEN} bytes, got {}",
                    master_key.len()
                ),
            });
        }
        let keys = Arc::new(DerivedKeys::derive(master_key)?);

        let db = sled::open(path).map_err(|e| PrivIdError::StorageError {
            reason: format!("failed to open sled database at {}: {e}", path.display()),
        })?;
        db.open_tree(GRANTS_TREE)
            .map_err(|e| PrivIdError::StorageError {
                reason: format!("failed to open tree '{GRANTS_TREE}': {e}"),
            })?;

        tracing::debug!(path = %path.display(), "storage engine opened");
        Ok(Self { db, keys })
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| PrivIdError::StorageError {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }

    pub(crate) fn tree<T>(&self, name: &str) -> Result<EncryptedTree<T>>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let tree = self.db.open_tree(name).map_err(|e| PrivIdError::StorageError {
            reason: format!("failed to open tree '{name}': {e}"),
        })?;
        Ok(EncryptedTree::new(tree, Arc::clone(&self.keys)))
    }

    /// Returns the durable grant store over this engine's `grants` tree.
    pub fn grants(&self) -> Result<DurableGrantStore> {
        Ok(DurableGrantStore::new(self.tree(GRANTS_TREE)?))
    }
}
