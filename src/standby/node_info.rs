//! Standby node records and their storage / role views

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::PublicKey;
use crate::types::{NetworkId, NodeId, NodeType};

/// A node registered as eligible for election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandbyNodeInfo {
    pub consensus_public_key: PublicKey,
    /// Stake per role the node registered for
    pub stake_container: BTreeMap<NodeType, u64>,
    pub program_version: String,
    pub is_genesis_node: bool,
}

impl StandbyNodeInfo {
    /// Stake in `node_type`, zero when the node did not register for it
    pub fn stake(&self, node_type: NodeType) -> u64 {
        self.stake_container.get(&node_type).copied().unwrap_or(0)
    }

    pub fn has_role(&self, node_type: NodeType) -> bool {
        self.stake_container.contains_key(&node_type)
    }
}

/// Candidates for one role, in canonical node id order
pub type StandbyPool = BTreeMap<NodeId, StandbyNodeInfo>;

/// Storage form of one network's standby nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandbyNetworkStorageResult {
    nodes: BTreeMap<NodeId, StandbyNodeInfo>,
    activated: bool,
}

impl StandbyNetworkStorageResult {
    /// Insert `info`, replacing a differing record. Returns whether anything changed.
    pub fn insert(&mut self, node_id: NodeId, info: StandbyNodeInfo) -> bool {
        match self.nodes.get(&node_id) {
            Some(existing) if *existing == info => false,
            _ => {
                self.nodes.insert(node_id, info);
                true
            }
        }
    }

    pub fn remove(&mut self, node_id: &NodeId) -> Option<StandbyNodeInfo> {
        self.nodes.remove(node_id)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&StandbyNodeInfo> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, StandbyNodeInfo> {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut BTreeMap<NodeId, StandbyNodeInfo> {
        &mut self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn activated(&self) -> bool {
        self.activated
    }

    /// Latch the activated state. Returns whether it changed.
    pub fn activate(&mut self) -> bool {
        let changed = !self.activated;
        self.activated = true;
        changed
    }

    /// Project into the per-role view the election consumes
    pub fn network_result(&self) -> StandbyNetworkResult {
        let mut result = StandbyNetworkResult::default();
        for (node_id, info) in &self.nodes {
            for node_type in info.stake_container.keys() {
                result
                    .pools
                    .entry(*node_type)
                    .or_default()
                    .insert(node_id.clone(), info.clone());
            }
        }
        result
    }
}

/// Role view of one network: `NodeType -> (NodeId -> StandbyNodeInfo)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandbyNetworkResult {
    pools: BTreeMap<NodeType, StandbyPool>,
}

impl StandbyNetworkResult {
    /// Standby nodes for `node_type`; empty when none registered
    pub fn result_of(&self, node_type: NodeType) -> StandbyPool {
        self.pools.get(&node_type).cloned().unwrap_or_default()
    }

    pub fn pool(&self, node_type: NodeType) -> Option<&StandbyPool> {
        self.pools.get(&node_type)
    }

    pub fn is_empty(&self) -> bool {
        self.pools.values().all(|pool| pool.is_empty())
    }

    pub fn pools(&self) -> impl Iterator<Item = (&NodeType, &StandbyPool)> {
        self.pools.iter()
    }
}

/// Standby nodes of every network, persisted as one string property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandbyResultStore {
    networks: BTreeMap<NetworkId, StandbyNetworkStorageResult>,
}

impl StandbyResultStore {
    pub fn result_of(&mut self, network_id: NetworkId) -> &mut StandbyNetworkStorageResult {
        self.networks.entry(network_id).or_default()
    }

    pub fn network(&self, network_id: NetworkId) -> Option<&StandbyNetworkStorageResult> {
        self.networks.get(&network_id)
    }

    pub fn networks_mut(&mut self) -> impl Iterator<Item = (&NetworkId, &mut StandbyNetworkStorageResult)> {
        self.networks.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.values().all(|n| n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(stakes: &[(NodeType, u64)]) -> StandbyNodeInfo {
        StandbyNodeInfo {
            consensus_public_key: PublicKey([7u8; 32]),
            stake_container: stakes.iter().copied().collect(),
            program_version: "1.0.0".to_string(),
            is_genesis_node: false,
        }
    }

    #[test]
    fn test_insert_reports_changes_only() {
        let mut result = StandbyNetworkStorageResult::default();
        let node = NodeId::from("T8node");
        assert!(result.insert(node.clone(), info(&[(NodeType::ConsensusAuditor, 10)])));
        assert!(!result.insert(node.clone(), info(&[(NodeType::ConsensusAuditor, 10)])));
        assert!(result.insert(node.clone(), info(&[(NodeType::ConsensusAuditor, 11)])));
        assert_eq!(result.get(&node).unwrap().stake(NodeType::ConsensusAuditor), 11);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_network_result_groups_by_role() {
        let mut result = StandbyNetworkStorageResult::default();
        result.insert(
            NodeId::from("a"),
            info(&[(NodeType::ConsensusAuditor, 5), (NodeType::ConsensusValidator, 5)]),
        );
        result.insert(NodeId::from("v"), info(&[(NodeType::ConsensusValidator, 3)]));

        let view = result.network_result();
        assert_eq!(view.result_of(NodeType::ConsensusAuditor).len(), 1);
        assert_eq!(view.result_of(NodeType::ConsensusValidator).len(), 2);
        assert!(view.result_of(NodeType::Edge).is_empty());
        assert!(!view.is_empty());
    }

    #[test]
    fn test_activation_latches() {
        let mut result = StandbyNetworkStorageResult::default();
        assert!(!result.activated());
        assert!(result.activate());
        assert!(!result.activate());
        assert!(result.activated());
    }

    #[test]
    fn test_unregistered_role_has_zero_stake() {
        let node = info(&[(NodeType::ConsensusValidator, 3)]);
        assert_eq!(node.stake(NodeType::ConsensusAuditor), 0);
        assert!(!node.has_role(NodeType::ConsensusAuditor));
    }
}
