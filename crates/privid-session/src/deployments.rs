//! Per-chain contract deployment table and session target resolution.
//!
//! The table is the JSON map produced at deploy time:
//!
//! ```json
//! {
//!   "31337": { "address": "0x...", "chainId": 31337, "chainName": "hardhat" }
//! }
//! ```
//!
//! A zero address marks a chain the contract is not deployed on.

use std::collections::BTreeMap;
use std::path::Path;

use privid_types::{ChainId, EvmAddress, PrivIdError, Result};
use serde::{Deserialize, Serialize};

use crate::provider::ConnectionState;

/// One chain's deployment record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub address: EvmAddress,
    pub chain_id: ChainId,
    pub chain_name: String,
}

/// Deployment records keyed by chain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeploymentRegistry {
    entries: BTreeMap<ChainId, Deployment>,
}

impl DeploymentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON deployment map.
    ///
    /// # Errors
    ///
    /// [`PrivIdError::ConfigError`] if the JSON is malformed, a key is
    /// not a chain id, or a key disagrees with its record's `chainId`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Deployment> =
            serde_json::from_str(json).map_err(|e| PrivIdError::ConfigError {
                reason: format!("invalid deployment table: {e}"),
            })?;

        let mut registry = Self::new();
        for (key, deployment) in raw {
            let chain: u64 = key.parse().map_err(|_| PrivIdError::ConfigError {
                reason: format!("deployment key '{key}' is not a chain id"),
            })?;
            if chain != deployment.chain_id.value() {
                return Err(PrivIdError::ConfigError {
                    reason: format!(
                        "deployment key {chain} disagrees with chainId {}",
                        deployment.chain_id
                    ),
                });
            }
            registry.insert(deployment);
        }
        Ok(registry)
    }

    /// Loads the table from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PrivIdError::ConfigError {
            reason: format!("cannot read deployment table {}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }

    /// Serializes the table back to its JSON map form.
    pub fn to_json(&self) -> Result<String> {
        let raw: BTreeMap<String, &Deployment> = self
            .entries
            .iter()
            .map(|(chain, d)| (chain.to_string(), d))
            .collect();
        serde_json::to_string_pretty(&raw).map_err(|e| PrivIdError::ConfigError {
            reason: format!("cannot serialize deployment table: {e}"),
        })
    }

    /// Adds or replaces a record.
    pub fn insert(&mut self, deployment: Deployment) {
        self.entries.insert(deployment.chain_id, deployment);
    }

    /// The live deployment on `chain`, or `None` if the chain is unknown
    /// or its address is zero.
    pub fn get(&self, chain: ChainId) -> Option<&Deployment> {
        self.entries.get(&chain).filter(|d| !d.address.is_zero())
    }

    /// Like [`get`](Self::get) but fails with
    /// [`PrivIdError::NotDeployed`].
    pub fn resolve(&self, chain: ChainId) -> Result<&Deployment> {
        self.get(chain)
            .ok_or(PrivIdError::NotDeployed { chain_id: chain })
    }

    /// Iterates all records, including undeployed ones.
    pub fn iter(&self) -> impl Iterator<Item = &Deployment> {
        self.entries.values()
    }
}

/// Everything a session needs to know about where it runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionTarget {
    pub chain_id: ChainId,
    pub account: EvmAddress,
    pub deployment: Deployment,
}

impl SessionTarget {
    /// Derives the target from the wallet connection and the deployment
    /// table.
    ///
    /// # Errors
    ///
    /// - [`PrivIdError::NoSigner`] if the wallet is not connected.
    /// - [`PrivIdError::NotDeployed`] if the contract has no live
    ///   deployment on the connected chain.
    pub fn resolve(state: &ConnectionState, registry: &DeploymentRegistry) -> Result<Self> {
        if !state.is_connected() {
            return Err(PrivIdError::NoSigner);
        }
        let (Some(chain_id), Some(account)) = (state.chain_id, state.account()) else {
            return Err(PrivIdError::NoSigner);
        };
        let deployment = registry.resolve(chain_id)?.clone();
        Ok(Self {
            chain_id,
            account,
            deployment,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
