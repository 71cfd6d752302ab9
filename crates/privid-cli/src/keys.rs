//! Local key files in the data directory.
//!
//! # Files
//!
//! - `grants.key`: 32 random bytes, the master key of the grant store.
//! - `account.json`: the devnet account the session signs with.
//!
//! ```json
//! {
//!   "version": 1,
//!   "address": "0x…",
//!   "secret_key": "<hex 32 bytes>"
//! }
//! ```
//!
//! Both files are written atomically (temp file + rename) and, on Unix,
//! readable by the owner only. The account is a development identity for
//! the in-process devnet, not a wallet.

use std::path::Path;

use privid_crypto::signing::EvmKeypair;
use privid_session::signer::{LocalSigner, Signer};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const MASTER_KEY_FILE: &str = "grants.key";
pub const ACCOUNT_FILE: &str = "account.json";
const MASTER_KEY_LEN: usize = 32;
const CURRENT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct AccountFileData {
    version: u32,
    address: String,
    secret_key: String,
}

/// Loads the grant-store master key, creating it on first use.
pub fn load_or_create_master_key(data_dir: &Path) -> Result<Vec<u8>, String> {
    let path = data_dir.join(MASTER_KEY_FILE);
    if path.exists() {
        let key = std::fs::read(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        if key.len() != MASTER_KEY_LEN {
            return Err(format!(
                "{} must hold {MASTER_KEY_LEN} bytes, found {}",
                path.display(),
                key.len()
            ));
        }
        return Ok(key);
    }

    let mut key = vec![0u8; MASTER_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    write_private(&path, &key)?;
    tracing::info!(path = %path.display(), "grant store key created");
    Ok(key)
}

/// Loads the devnet account, creating a random one on first use.
pub fn load_or_create_account(data_dir: &Path) -> Result<LocalSigner, String> {
    let path = data_dir.join(ACCOUNT_FILE);
    if path.exists() {
        let json = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read account file: {e}"))?;
        let data: AccountFileData = serde_json::from_str(&json)
            .map_err(|e| format!("failed to parse account file: {e}"))?;
        if data.version != CURRENT_VERSION {
            return Err(format!(
                "unsupported account file version {} (expected {CURRENT_VERSION})",
                data.version
            ));
        }
        let signer = LocalSigner::from_hex(&data.secret_key).map_err(|e| e.to_string())?;
        if signer.address().to_string() != data.address.to_lowercase() {
            return Err("account file address does not match its key".into());
        }
        return Ok(signer);
    }

    let keypair = EvmKeypair::generate();
    let data = AccountFileData {
        version: CURRENT_VERSION,
        address: keypair.address().map_err(|e| e.to_string())?.to_string(),
        secret_key: hex::encode(keypair.secret_bytes()),
    };
    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    write_private(&path, json.as_bytes())?;
    tracing::info!(address = %data.address, "devnet account created");

    LocalSigner::new(keypair).map_err(|e| e.to_string())
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<(), String> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)
        .map_err(|e| format!("failed to write {}: {e}", tmp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| format!("failed to restrict {}: {e}", tmp_path.display()))?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        format!("failed to rename {}: {e}", path.display())
    })
}
