//! Wiring of a session against the in-process devnet.
//!
//! Mirrors what a browser client does on page load: attach the wallet
//! provider, learn its chain and account, look the contract up in the
//! deployment table, and bind a session to it.

use std::path::PathBuf;
use std::sync::Arc;

use privid_session::deployments::{DeploymentRegistry, SessionTarget};
use privid_session::devnet::Devnet;
use privid_session::provider::{ProviderEvent, ProviderTracker};
use privid_session::session::SessionManager;
use privid_session::signer::{LocalSigner, Signer};
use privid_storage::engine::StorageEngine;
use privid_storage::grants::DurableGrantStore;
use privid_storage::GrantStore;

use crate::config::CliConfig;
use crate::keys;

/// Subdirectory of the data dir holding the grant database.
pub const GRANTS_DIR: &str = "grants";

/// Loads the configured deployment table, or the devnet's own record when
/// none is configured.
pub fn deployment_registry(
    cfg: &CliConfig,
    devnet: &Devnet,
) -> Result<DeploymentRegistry, String> {
    match cfg.deployments {
        Some(ref path) => {
            let registry = DeploymentRegistry::load(path).map_err(|e| e.to_string())?;
            tracing::debug!(path = %path.display(), "deployment table loaded");
            Ok(registry)
        }
        None => {
            let mut registry = DeploymentRegistry::new();
            registry.insert(devnet.deployment());
            Ok(registry)
        }
    }
}

/// Resolves where `signer` is connected on `devnet`.
pub fn connect(
    devnet: &Devnet,
    signer: &LocalSigner,
    registry: &DeploymentRegistry,
) -> Result<SessionTarget, String> {
    let mut tracker = ProviderTracker::new();
    let generation = tracker.attach();
    tracker
        .apply(
            generation,
            ProviderEvent::Connect {
                chain_id: format!("{:#x}", devnet.chain_id().value()),
            },
        )
        .map_err(|e| e.to_string())?;
    tracker
        .apply(generation, ProviderEvent::AccountsChanged(vec![signer.address()]))
        .map_err(|e| e.to_string())?;

    let target = SessionTarget::resolve(&tracker.state(), registry).map_err(|e| e.to_string())?;
    tracing::info!(
        chain = %target.chain_id,
        account = %target.account,
        contract = %target.deployment.address,
        "session target resolved"
    );
    Ok(target)
}

/// Builds a session for `signer` on `devnet`, caching grants in `store`.
pub fn open_session(
    devnet: &Arc<Devnet>,
    signer: Arc<LocalSigner>,
    store: Arc<dyn GrantStore>,
    cfg: &CliConfig,
) -> Result<SessionManager, String> {
    let registry = deployment_registry(cfg, devnet)?;
    let target = connect(devnet, &signer, &registry)?;
    if target.deployment.address != devnet.contract_address() {
        return Err(format!(
            "deployment table points at {}, devnet hosts {}",
            target.deployment.address,
            devnet.contract_address()
        ));
    }
    let session = SessionManager::new(Arc::new(devnet.contract()), store, &cfg.app)
        .map_err(|e| e.to_string())?
        .with_capability(Arc::new(devnet.capability()))
        .with_signer(signer);
    Ok(session)
}

/// Opens the durable grant store under the configured data dir.
pub fn open_grant_store(cfg: &CliConfig) -> Result<(StorageEngine, DurableGrantStore), String> {
    std::fs::create_dir_all(&cfg.data_dir)
        .map_err(|e| format!("failed to create data directory: {e}"))?;
    let key = keys::load_or_create_master_key(&cfg.data_dir)?;
    let path: PathBuf = cfg.data_dir.join(GRANTS_DIR);
    let engine = StorageEngine::open(&path, &key).map_err(|e| e.to_string())?;
    let store = engine.grants().map_err(|e| e.to_string())?;
    tracing::debug!(path = %path.display(), "grant store opened");
    Ok((engine, store))
}
