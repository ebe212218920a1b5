//! Node settings for the `elect-node` binary

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ConfigError, GovernanceParams, ParamTable};

/// Genesis seed node registered by the standby pool setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedNodeConfig {
    pub node_id: String,
    /// Hex-encoded x-only consensus public key
    pub public_key: String,
    /// Stake credited to the seed in every role
    #[serde(default = "default_seed_stake")]
    pub stake: u64,
}

fn default_seed_stake() -> u64 {
    1
}

/// Fixed first-round layout used instead of a randomized genesis election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConsensusConfig {
    /// `"auditor:id.stake.pubkey,...|validator:id.stake.pubkey,...|..."`
    pub layout: String,
    /// Wall-clock milliseconds to wait after start before electing
    #[serde(default)]
    pub warmup_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub network_id: u32,
    pub rpc_port: u16,
    /// Wall-clock milliseconds per logical clock tick
    pub tick_millis: u64,
    pub seed_nodes: Vec<SeedNodeConfig>,
    /// Extra standby nodes registered at startup with generated keys
    pub simulated_nodes: u16,
    pub static_consensus: Option<StaticConsensusConfig>,
    /// Governance parameter overrides, keyed like the on-chain parameters
    pub governance: BTreeMap<String, u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("elect-data"),
            network_id: 255,
            rpc_port: 19090,
            tick_millis: 1000,
            seed_nodes: Vec::new(),
            simulated_nodes: 32,
            static_consensus: None,
            governance: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file; `None` yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: NodeConfig = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            None => NodeConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_millis == 0 {
            return Err(ConfigError::Node("tick_millis must be non-zero".into()));
        }
        if self.seed_nodes.is_empty() && self.simulated_nodes == 0 && self.static_consensus.is_none() {
            return Err(ConfigError::Node(
                "no seed nodes, simulated nodes or static layout: nothing to elect".into(),
            ));
        }
        Ok(())
    }

    /// Governance parameters with this node's overrides applied
    pub fn governance_params(&self) -> Result<GovernanceParams, ConfigError> {
        GovernanceParams::from_source(&ParamTable(self.governance.clone()))
    }
}
