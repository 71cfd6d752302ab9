//! Config file support and resolution.
//!
//! The CLI can be configured via flags, a JSON config file, or both
//! (flags override the file).
//!
//! Example `privid.json`:
//!
//! ```json
//! {
//!   "data_dir": "/home/alice/.privid",
//!   "chain_id": 31337,
//!   "grant_duration_days": 30,
//!   "confirmation_timeout_secs": 60,
//!   "deployments": "/home/alice/privid/deployments.json"
//! }
//! ```

use std::path::{Path, PathBuf};

use privid_types::config::AppConfig;
use privid_types::ChainId;
use serde::{Deserialize, Serialize};

/// Chain the devnet runs on unless configured otherwise.
pub const DEFAULT_CHAIN_ID: u64 = 31337;

// ---------------------------------------------------------------------------
// Overrides from flags
// ---------------------------------------------------------------------------

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub data_dir: Option<PathBuf>,
    pub chain_id: Option<u64>,
    pub grant_duration_days: Option<u32>,
    pub confirmation_timeout_secs: Option<u64>,
    pub deployments: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub data_dir: Option<String>,
    pub chain_id: Option<u64>,
    pub grant_duration_days: Option<u32>,
    pub confirmation_timeout_secs: Option<u64>,
    pub deployments: Option<String>,
}

impl ConfigFile {
    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Fully resolved CLI configuration with all defaults applied.
#[derive(Debug, Clone, Serialize)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    pub chain_id: ChainId,
    /// Deployment table (`{chainId: {address, chainId, chainName}}`).
    /// When unset, the devnet's own deployment is used.
    pub deployments: Option<PathBuf>,
    #[serde(flatten)]
    pub app: AppConfig,
}

impl CliConfig {
    /// Resolves the configuration from an optional file and flag
    /// overrides, then validates it.
    pub fn resolve(file: Option<&Path>, cli: &CliOverrides) -> Result<Self, String> {
        let base = match file {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        let config = Self::from_file(base).merge_cli(cli);
        config.app.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Applies defaults to a parsed config file.
    pub fn from_file(file: ConfigFile) -> Self {
        let defaults = AppConfig::default();
        Self {
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            chain_id: ChainId::new(file.chain_id.unwrap_or(DEFAULT_CHAIN_ID)),
            deployments: file.deployments.map(PathBuf::from),
            app: AppConfig {
                grant_duration_days: file
                    .grant_duration_days
                    .unwrap_or(defaults.grant_duration_days),
                confirmation_timeout_secs: file
                    .confirmation_timeout_secs
                    .unwrap_or(defaults.confirmation_timeout_secs),
            },
        }
    }

    /// Merges flag overrides onto a file-based config.
    pub fn merge_cli(mut self, cli: &CliOverrides) -> Self {
        if let Some(ref dir) = cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(chain) = cli.chain_id {
            self.chain_id = ChainId::new(chain);
        }
        if let Some(days) = cli.grant_duration_days {
            self.app.grant_duration_days = days;
        }
        if let Some(secs) = cli.confirmation_timeout_secs {
            self.app.confirmation_timeout_secs = secs;
        }
        if let Some(ref path) = cli.deployments {
            self.deployments = Some(path.clone());
        }
        self
    }
}

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".privid");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("PrivID");
    }
    PathBuf::from("privid-data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_file() {
        let cfg = CliConfig::from_file(ConfigFile::default());
        assert_eq!(cfg.chain_id, ChainId::new(DEFAULT_CHAIN_ID));
        assert_eq!(cfg.app.grant_duration_days, 365);
        assert_eq!(cfg.app.confirmation_timeout_secs, 120);
        assert!(cfg.deployments.is_none());
    }

    #[test]
    fn flags_override_file() {
        let file = ConfigFile {
            data_dir: Some("/from/file".into()),
            chain_id: Some(1),
            grant_duration_days: Some(10),
            confirmation_timeout_secs: None,
            deployments: Some("/from/file/deployments.json".into()),
        };
        let cli = CliOverrides {
            data_dir: Some(PathBuf::from("/from/flag")),
            grant_duration_days: Some(3),
            deployments: Some(PathBuf::from("/from/flag/deployments.json")),
            ..CliOverrides::default()
        };
        let cfg = CliConfig::from_file(file).merge_cli(&cli);
        assert_eq!(cfg.data_dir, PathBuf::from("/from/flag"));
        assert_eq!(cfg.chain_id, ChainId::new(1));
        assert_eq!(cfg.app.grant_duration_days, 3);
        assert_eq!(cfg.app.confirmation_timeout_secs, 120);
        assert_eq!(
            cfg.deployments,
            Some(PathBuf::from("/from/flag/deployments.json"))
        );
    }

    #[test]
    fn invalid_values_rejected() {
        let cli = CliOverrides {
            data_dir: Some(PathBuf::from("/tmp/privid-unused")),
            grant_duration_days: Some(0),
            ..CliOverrides::default()
        };
        assert!(CliConfig::resolve(None, &cli).is_err());
    }

    #[test]
    fn unknown_file_keys_rejected() {
        let parsed: Result<ConfigFile, _> = serde_json::from_str(r#"{"rpc_port": 1}"#);
        assert!(parsed.is_err());
    }
}
