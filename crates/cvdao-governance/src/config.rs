//! Governor configuration.
//!
//! Handles loading and validation of governor configuration from TOML.

use std::path::Path;

use cvdao_types::Address;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;
use crate::params::ParamsTable;

/// Constructor-time governor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Address the governor acts as (treasury withdraw caller)
    pub governor: Address,
    /// Initial Admin holder
    pub admin: Address,
    /// External timelock actor. Recorded only; execution goes through the
    /// internal queue.
    pub secondary_timelock: Option<Address>,
    /// Seconds between creation and the voting snapshot
    pub voting_delay: u64,
    /// Per-type voting period, quorum and execution delay
    pub params: ParamsTable,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            governor: Address::from_seed(b"cvdao.governor"),
            admin: Address::from_seed(b"cvdao.admin"),
            secondary_timelock: None,
            voting_delay: 1,
            params: ParamsTable::default(),
        }
    }
}

impl GovernorConfig {
    /// Parse configuration from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, GovernanceError> {
        let config: GovernorConfig = toml::from_str(contents)
            .map_err(|e| GovernanceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file.
    pub fn from_file(path: &Path) -> Result<Self, GovernanceError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GovernanceError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, GovernanceError> {
        toml::to_string_pretty(self)
            .map_err(|e| GovernanceError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.governor.is_zero() {
            return Err(GovernanceError::Config("Governor address cannot be zero".to_string()));
        }
        if self.admin.is_zero() {
            return Err(GovernanceError::Config("Admin address cannot be zero".to_string()));
        }
        if self.secondary_timelock.is_some_and(|t| t.is_zero()) {
            return Err(GovernanceError::Config("Secondary timelock address cannot be zero".to_string()));
        }
        if self.voting_delay == 0 {
            return Err(GovernanceError::Config(
                "Voting delay must be at least 1 second".to_string(),
            ));
        }
        self.params.validate()
    }
}
