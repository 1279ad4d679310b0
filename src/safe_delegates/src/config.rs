use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::registry::ChainId;

/// Environment variable holding one Safe address or a comma-separated list
pub const SAFE_ADDRESS_ENV: &str = "SAFE_ADDRESS";

/// Environment variable overriding the transaction service base URL
pub const SERVICE_URL_ENV: &str = "SAFE_TX_SERVICE_URL";

/// Chain the [`SERVICE_URL_ENV`] override applies to
pub const SERVICE_CHAIN_ENV: &str = "SAFE_CHAIN_ID";

/// Configuration for the delegate manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatesConfig {
    /// Safe addresses, comma-separated. Absent means not configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_addresses: Option<String>,
    /// Per-request timeout for the transaction service
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Transaction service endpoints overriding the hosted ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceEndpoint>,
}

/// Transaction service endpoint for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub chain_id: ChainId,
    pub url: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for DelegatesConfig {
    fn default() -> Self {
        Self {
            safe_addresses: None,
            request_timeout_secs: default_request_timeout_secs(),
            service: Vec::new(),
        }
    }
}

impl DelegatesConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply environment overrides on top of this configuration
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(safes) = lookup(SAFE_ADDRESS_ENV).filter(|s| !s.trim().is_empty()) {
            self.safe_addresses = Some(safes);
        }

        if let Some(url) = lookup(SERVICE_URL_ENV).filter(|s| !s.trim().is_empty()) {
            let chain_id: ChainId = lookup(SERVICE_CHAIN_ENV)
                .with_context(|| format!("{SERVICE_URL_ENV} requires {SERVICE_CHAIN_ENV}"))?
                .trim()
                .parse()
                .with_context(|| format!("{SERVICE_CHAIN_ENV} is not a chain id"))?;

            self.service.retain(|endpoint| endpoint.chain_id != chain_id);
            self.service.push(ServiceEndpoint { chain_id, url });
        }

        Ok(self)
    }
}
