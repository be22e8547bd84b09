//! Host configuration file (`hostwire.toml`).
//!
//! ```toml
//! max_concurrent_requests = 128
//!
//! [request]
//! connect_timeout_ms = 1000
//! first_byte_timeout_ms = 30000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::RequestOptions;

/// Settings for the in-process host side of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Handler invocations the loopback transport runs at once. Further
    /// requests wait for a slot, bounded by `connect_timeout_ms`.
    pub max_concurrent_requests: usize,
    /// Timeouts used when a request carries no options of its own.
    pub request: RequestOptions,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 64,
            request: RequestOptions::default(),
        }
    }
}

impl HostConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: HostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Builder method: set the handler concurrency limit.
    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit;
        self
    }

    /// Builder method: set default request timeouts.
    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request = options;
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_concurrent_requests > 0,
            "max_concurrent_requests must be at least 1"
        );
        Ok(())
    }
}
