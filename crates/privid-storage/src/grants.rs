//! Durable, encrypted decryption-grant store.

use privid_types::{DecryptionGrant, PrivIdError, Result};

use crate::encrypted_tree::EncryptedTree;
use crate::GrantStore;

/// Grant store persisted in the engine's `grants` tree.
///
/// Obtained from [`crate::engine::StorageEngine::grants`]. Cheap to
/// clone; clones share the underlying tree.
#[derive(Clone)]
pub struct DurableGrantStore {
    tree: EncryptedTree<DecryptionGrant>,
}

impl DurableGrantStore {
    pub(crate) fn new(tree: EncryptedTree<DecryptionGrant>) -> Self {
        Self { tree }
    }
}

fn key_string(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|e| PrivIdError::StorageError {
        reason: format!("grant key is not UTF-8: {e}"),
    })
}

impl GrantStore for DurableGrantStore {
    fn get(&self, key: &str) -> Result<Option<DecryptionGrant>> {
        self.tree.get(key.as_bytes())
    }

    fn put(&self, key: &str, grant: &DecryptionGrant) -> Result<()> {
        self.tree.insert(key.as_bytes(), grant)?;
        self.tree.flush()
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.tree.keys()?.into_iter().map(key_string).collect()
    }
}
