//! Integration tests for the durable grant store.
//!
//! Each test opens its own sled database in a unique temp directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use privid_storage::engine::{StorageEngine, GRANTS_TREE};
use privid_storage::GrantStore;
use privid_types::{DecryptionGrant, EvmAddress, GrantSecret};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a unique temporary directory for each test.
fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "privid-grants-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ))
}

fn cleanup(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

fn test_key() -> [u8; 32] {
    let mut k = [0u8; 32];
    for (i, byte) in k.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(7).wrapping_add(0xAB);
    }
    k
}

fn grant(seed: u8, start: u64) -> DecryptionGrant {
    DecryptionGrant {
        private_key: GrantSecret::new(vec![seed; 32]),
        public_key: vec![seed.wrapping_add(1); 33],
        signature: vec![seed.wrapping_add(2); 65],
        contract_addresses: vec![EvmAddress::new([seed; 20])],
        user_address: EvmAddress::new([0xAA; 20]),
        start_timestamp: start,
        duration_days: 365,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn put_get_remove() -> TestResult {
    let dir = temp_dir();
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        let store = engine.grants()?;

        assert!(store.get("user:set")?.is_none());
        store.put("user:set", &grant(1, 100))?;
        assert_eq!(store.get("user:set")?, Some(grant(1, 100)));
        assert_eq!(store.keys()?.len(), 1);

        assert!(store.remove("user:set")?);
        assert!(store.get("user:set")?.is_none());
        assert!(store.keys()?.is_empty());
    }
    cleanup(&dir);
    Ok(())
}

#[test]
fn grants_survive_reopen() -> TestResult {
    let dir = temp_dir();
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        engine.grants()?.put("a", &grant(1, 100))?;
        engine.grants()?.put("b", &grant(2, 200))?;
        engine.flush()?;
    }
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        let entries = engine.grants()?.entries()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("a".to_string(), grant(1, 100)));
        assert_eq!(entries[1], ("b".to_string(), grant(2, 200)));
    }
    cleanup(&dir);
    Ok(())
}

#[test]
fn wrong_master_key_fails_authentication() -> TestResult {
    let dir = temp_dir();
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        engine.grants()?.put("a", &grant(1, 100))?;
        engine.flush()?;
    }
    {
        let engine = StorageEngine::open(&dir, &[0x11; 32])?;
        assert!(engine.grants()?.get("a").is_err());
    }
    cleanup(&dir);
    Ok(())
}

#[test]
fn tampered_record_detected_and_clearable() -> TestResult {
    let dir = temp_dir();
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        engine.grants()?.put("a", &grant(1, 100))?;
        engine.flush()?;
    }
    {
        let db = sled::open(&dir)?;
        let tree = db.open_tree(GRANTS_TREE)?;
        let mut raw = tree.get("a")?.map(|v| v.to_vec()).unwrap_or_default();
        assert!(!raw.is_empty());
        raw[30] ^= 0xFF;
        tree.insert("a", raw)?;
        db.flush()?;
    }
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        let store = engine.grants()?;
        assert!(store.get("a").is_err());
        assert_eq!(store.clear()?, 1);
        assert!(store.get("a")?.is_none());
    }
    cleanup(&dir);
    Ok(())
}

#[test]
fn unreadable_record_does_not_hide_the_rest() -> TestResult {
    let dir = temp_dir();
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        let store = engine.grants()?;
        store.put("a", &grant(1, 100))?;
        store.put("b", &grant(2, 200))?;
        engine.flush()?;
    }
    {
        let db = sled::open(&dir)?;
        let tree = db.open_tree(GRANTS_TREE)?;
        let mut raw = tree.get("a")?.map(|v| v.to_vec()).unwrap_or_default();
        assert!(!raw.is_empty());
        raw[30] ^= 0xFF;
        tree.insert("a", raw)?;
        db.flush()?;
    }
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        let store = engine.grants()?;
        assert_eq!(store.keys()?, vec!["a".to_string(), "b".to_string()]);
        let entries = store.entries()?;
        assert_eq!(entries, vec![("b".to_string(), grant(2, 200))]);
        assert_eq!(store.clear()?, 2);
        assert!(store.keys()?.is_empty());
    }
    cleanup(&dir);
    Ok(())
}

#[test]
fn record_moved_to_other_key_rejected() -> TestResult {
    let dir = temp_dir();
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        engine.grants()?.put("a", &grant(1, 100))?;
        engine.flush()?;
    }
    {
        let db = sled::open(&dir)?;
        let tree = db.open_tree(GRANTS_TREE)?;
        if let Some(raw) = tree.get("a")? {
            tree.insert("b", raw)?;
        }
        db.flush()?;
    }
    {
        let engine = StorageEngine::open(&dir, &test_key())?;
        let store = engine.grants()?;
        assert!(store.get("a")?.is_some());
        assert!(store.get("b").is_err());
    }
    cleanup(&dir);
    Ok(())
}

#[test]
fn short_master_key_rejected() {
    let dir = temp_dir();
    assert!(StorageEngine::open(&dir, &[0u8; 16]).is_err());
    cleanup(&dir);
}
