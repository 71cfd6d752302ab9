//! Client configuration with sensible defaults.
//!
//! All operational parameters of a session live here. Every value has a
//! documented default; the CLI overlays its config file and flags on top.

use serde::{Deserialize, Serialize};

use crate::{PrivIdError, Result};

/// Global client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Validity window of a freshly signed decryption grant, in days.
    /// Grants are never extended; an expired grant is re-signed.
    pub grant_duration_days: u32,

    /// Upper bound on a single transaction confirmation wait, in seconds.
    ///
    /// `0` waits indefinitely.
    pub confirmation_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            grant_duration_days: 365,
            confirmation_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.grant_duration_days == 0 {
            return Err(PrivIdError::ConfigError {
                reason: "grant_duration_days must be greater than 0".into(),
            });
        }

        // Keeps start + duration inside the uint256 range the signer sees
        // and well clear of u64 overflow.
        if self.grant_duration_days > 36_500 {
            return Err(PrivIdError::ConfigError {
                reason: "grant_duration_days must be at most 36500".into(),
            });
        }

        Ok(())
    }

    /// Confirmation timeout, or `None` when waits are unbounded.
    pub fn confirmation_timeout(&self) -> Option<std::time::Duration> {
        match self.confirmation_timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}
