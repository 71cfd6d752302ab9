//! Grant persistence for the PrivID client.
//!
//! Decryption grants are cached under a string key derived from the user
//! and the normalized contract set. This crate defines the [`GrantStore`]
//! seam and two implementations:
//!
//! - [`memory::MemoryGrantStore`]: process-lifetime cache for one session.
//! - [`grants::DurableGrantStore`]: sled-backed store whose values are
//!   encrypted and authenticated at rest, reused across restarts.

pub mod encrypted_tree;
pub mod engine;
pub mod grants;
pub mod memory;

use privid_types::{DecryptionGrant, Result};

/// Key-value persistence for decryption grants.
///
/// Writes are last-write-wins per key. Implementations must be safe to
/// share between tasks.
pub trait GrantStore: Send + Sync {
    /// Returns the grant stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`privid_types::PrivIdError::StorageError`] if the backing
    /// store cannot be read or the record fails authentication.
    fn get(&self, key: &str) -> Result<Option<DecryptionGrant>>;

    /// Stores `grant` under `key`, replacing any previous value.
    fn put(&self, key: &str, grant: &DecryptionGrant) -> Result<()>;

    /// Removes the grant under `key`. Returns `true` if one existed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// Returns every stored key, without loading the records.
    fn keys(&self) -> Result<Vec<String>>;

    /// Returns every `(key, grant)` pair that loads.
    ///
    /// Records that fail to read or authenticate are logged and skipped,
    /// so one corrupt record does not hide the rest. `clear` still
    /// removes them.
    fn entries(&self) -> Result<Vec<(String, DecryptionGrant)>> {
        let mut out = Vec::new();
        for key in self.keys()? {
            match self.get(&key) {
                Ok(Some(grant)) => out.push((key, grant)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%key, error = %e, "skipping unreadable grant record");
                }
            }
        }
        Ok(out)
    }

    /// Removes every stored grant, readable or not, and returns how many
    /// were removed.
    fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys()? {
            if self.remove(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
