//! Node Configuration
//!
//! Values come from an optional TOML file; command-line flags override them.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory for the sled database
    pub data_dir: PathBuf,
    /// Keep all state in memory; nothing survives a restart
    pub in_memory: bool,
    /// Genesis allocation (JSON)
    pub genesis: PathBuf,
    /// HTTP RPC bind address, driven by the consensus engine
    pub rpc_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
    /// Consensus engine RPC endpoint for forwarding transactions
    pub consensus_rpc: String,
    /// Bound on waiting for the consensus engine to acknowledge a forward
    pub forward_timeout_ms: u64,
    /// Startup readiness probes of the consensus engine
    pub consensus_wait_attempts: u32,
    pub consensus_wait_interval_ms: u64,
    /// Committed states kept in memory for view derivation
    pub state_history: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            genesis: PathBuf::from("./genesis.json"),
            rpc_addr: "127.0.0.1:26658".to_string(),
            ws_addr: "127.0.0.1:26659".to_string(),
            consensus_rpc: "http://127.0.0.1:26657".to_string(),
            forward_timeout_ms: 5_000,
            consensus_wait_attempts: 30,
            consensus_wait_interval_ms: 1_000,
            state_history: 16,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file; missing keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.forward_timeout_ms > 0, "forward_timeout_ms must be positive");
        anyhow::ensure!(self.state_history > 0, "state_history must be at least 1");
        Ok(())
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn consensus_wait_interval(&self) -> Duration {
        Duration::from_millis(self.consensus_wait_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            rpc_addr = "0.0.0.0:9000"
            in_memory = true
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc_addr, "0.0.0.0:9000");
        assert!(config.in_memory);
        assert_eq!(config.ws_addr, NodeConfig::default().ws_addr);
        assert_eq!(config.forward_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(NodeConfig::from_toml("forward_timeout_ms = 0").is_err());
        assert!(NodeConfig::from_toml("state_history = 0").is_err());
    }

    #[test]
    fn test_rejects_unknown_types() {
        assert!(NodeConfig::from_toml("state_history = \"many\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "consensus_rpc = \"http://10.0.0.1:26657\"\n").unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.consensus_rpc, "http://10.0.0.1:26657");
        assert!(NodeConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
