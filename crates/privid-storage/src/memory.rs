//! In-memory grant store.

use std::collections::HashMap;
use std::sync::RwLock;

use privid_types::{DecryptionGrant, PrivIdError, Result};

use crate::GrantStore;

/// Grant store that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<String, DecryptionGrant>>,
}

impl MemoryGrantStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored grants.
    pub fn len(&self) -> usize {
        self.grants.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Returns `true` if no grants are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> PrivIdError {
    PrivIdError::StorageError {
        reason: "grant store lock poisoned".into(),
    }
}

impl GrantStore for MemoryGrantStore {
    fn get(&self, key: &str) -> Result<Option<DecryptionGrant>> {
        let grants = self.grants.read().map_err(|_| poisoned())?;
        Ok(grants.get(key).cloned())
    }

    fn put(&self, key: &str, grant: &DecryptionGrant) -> Result<()> {
        let mut grants = self.grants.write().map_err(|_| poisoned())?;
        grants.insert(key.to_string(), grant.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut grants = self.grants.write().map_err(|_| poisoned())?;
        Ok(grants.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let grants = self.grants.read().map_err(|_| poisoned())?;
        let mut keys: Vec<String> = grants.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use privid_types::{EvmAddress, GrantSecret};

    use super::*;

    fn grant(start: u64) -> DecryptionGrant {
        DecryptionGrant {
            private_key: GrantSecret::new(vec![1; 32]),
            public_key: vec![2; 33],
            signature: vec![3; 65],
            contract_addresses: vec![EvmAddress::new([4; 20])],
            user_address: EvmAddress::new([5; 20]),
            start_timestamp: start,
            duration_days: 1,
        }
    }

    #[test]
    fn put_get_remove() -> std::result::Result<(), PrivIdError> {
        let store = MemoryGrantStore::new();
        assert!(store.get("k")?.is_none());

        store.put("k", &grant(1))?;
        assert_eq!(store.get("k")?, Some(grant(1)));
        assert_eq!(store.len(), 1);

        assert!(store.remove("k")?);
        assert!(!store.remove("k")?);
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn last_write_wins() -> std::result::Result<(), PrivIdError> {
        let store = MemoryGrantStore::new();
        store.put("k", &grant(1))?;
        store.put("k", &grant(2))?;
        assert_eq!(store.get("k")?.map(|g| g.start_timestamp), Some(2));
        Ok(())
    }

    #[test]
    fn clear_removes_everything() -> std::result::Result<(), PrivIdError> {
        let store = MemoryGrantStore::new();
        store.put("a", &grant(1))?;
        store.put("b", &grant(2))?;
        assert_eq!(store.clear()?, 2);
        assert!(store.entries()?.is_empty());
        Ok(())
    }
}
