//! Agent configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Agent tunables, read from `HOSTPORTS_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Reconciliation tick period in seconds
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Deadline for the runtime queries of one cycle, in seconds
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Runtime dial timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Path or name of the nft executable
    #[serde(default = "default_nft_binary")]
    pub nft_binary: String,

    /// Port for the health/metrics server; disabled when unset
    #[serde(default)]
    pub api_port: Option<u16>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_sync_interval() -> u64 {
    1
}

fn default_cycle_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_nft_binary() -> String {
    "nft".to_string()
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("HOSTPORTS").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid HOSTPORTS_* configuration")?;

        if config.sync_interval_secs == 0 {
            anyhow::bail!("HOSTPORTS_SYNC_INTERVAL_SECS must be at least 1");
        }

        Ok(config)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
