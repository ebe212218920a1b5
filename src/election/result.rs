//! Election results
//!
//! The result hierarchy mirrors how the groups are addressed:
//! network -> node type -> cluster -> group -> members. Each auditor group's
//! result (itself plus its associated validator groups) is persisted as a
//! separate string property of the election contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::{hash_bytes, Hash, PublicKey};
use crate::storage::StorageError;
use crate::types::{ClusterId, GroupId, LogicTime, NetworkId, NodeId, NodeType};

/// Per-member election record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionInfo {
    /// Group version at which this node entered the group
    pub joined_version: u64,
    pub stake: u64,
    pub comprehensive_stake: u64,
    pub consensus_public_key: PublicKey,
}

/// Current membership of one group plus its metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionGroupResult {
    nodes: BTreeMap<NodeId, ElectionInfo>,
    /// `None` until the group is elected for the first time
    pub group_version: Option<u64>,
    pub election_committee_version: Option<u64>,
    /// Logical time of the last election
    pub timestamp: LogicTime,
    /// Logical time from which the last election takes effect
    pub start_time: LogicTime,
    pub associated_group_id: Option<GroupId>,
    pub associated_group_version: Option<u64>,
    pub cluster_version: Option<u64>,
}

impl ElectionGroupResult {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&ElectionInfo> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, ElectionInfo> {
        &self.nodes
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn insert(&mut self, node_id: NodeId, info: ElectionInfo) {
        self.nodes.insert(node_id, info);
    }

    /// Replace the whole membership
    pub fn set_members(&mut self, nodes: BTreeMap<NodeId, ElectionInfo>) {
        self.nodes = nodes;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionClusterResult {
    groups: BTreeMap<GroupId, ElectionGroupResult>,
}

impl ElectionClusterResult {
    pub fn result_of(&mut self, group_id: GroupId) -> &mut ElectionGroupResult {
        self.groups.entry(group_id).or_default()
    }

    pub fn group(&self, group_id: GroupId) -> Option<&ElectionGroupResult> {
        self.groups.get(&group_id)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupId, &ElectionGroupResult)> {
        self.groups.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionNodeTypeResult {
    clusters: BTreeMap<ClusterId, ElectionClusterResult>,
}

impl ElectionNodeTypeResult {
    pub fn result_of(&mut self, cluster_id: ClusterId) -> &mut ElectionClusterResult {
        self.clusters.entry(cluster_id).or_default()
    }

    pub fn cluster(&self, cluster_id: ClusterId) -> Option<&ElectionClusterResult> {
        self.clusters.get(&cluster_id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = (&ClusterId, &ElectionClusterResult)> {
        self.clusters.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionNetworkResult {
    node_types: BTreeMap<NodeType, ElectionNodeTypeResult>,
}

impl ElectionNetworkResult {
    pub fn result_of(&mut self, node_type: NodeType) -> &mut ElectionNodeTypeResult {
        self.node_types.entry(node_type).or_default()
    }

    pub fn group(&self, node_type: NodeType, cluster_id: ClusterId, group_id: GroupId) -> Option<&ElectionGroupResult> {
        self.node_types
            .get(&node_type)
            .and_then(|t| t.cluster(cluster_id))
            .and_then(|c| c.group(group_id))
    }

    pub fn node_types(&self) -> impl Iterator<Item = (&NodeType, &ElectionNodeTypeResult)> {
        self.node_types.iter()
    }
}

/// Election results of every network, as persisted per auditor group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResultStore {
    networks: BTreeMap<NetworkId, ElectionNetworkResult>,
}

impl ElectionResultStore {
    pub fn result_of(&mut self, network_id: NetworkId) -> &mut ElectionNetworkResult {
        self.networks.entry(network_id).or_default()
    }

    pub fn network(&self, network_id: NetworkId) -> Option<&ElectionNetworkResult> {
        self.networks.get(&network_id)
    }

    pub fn group(
        &self,
        network_id: NetworkId,
        node_type: NodeType,
        cluster_id: ClusterId,
        group_id: GroupId,
    ) -> Option<&ElectionGroupResult> {
        self.network(network_id)
            .and_then(|n| n.group(node_type, cluster_id, group_id))
    }

    /// Whether no group in the store has members
    pub fn is_empty(&self) -> bool {
        self.networks.values().all(|network| {
            network
                .node_types()
                .all(|(_, t)| t.clusters().all(|(_, c)| c.groups().all(|(_, g)| g.is_empty())))
        })
    }

    /// Content digest, logged alongside committed elections
    pub fn digest(&self) -> Result<Hash, StorageError> {
        Ok(hash_bytes(&bincode::serialize(self)?))
    }
}

/// Per-auditor-group stores of one cluster, keyed by auditor group id
pub type ClusterElectionStores = BTreeMap<GroupId, ElectionResultStore>;

/// Name of the election contract property holding `auditor_group_id`'s store
pub fn election_result_property_name(auditor_group_id: GroupId) -> String {
    format!("election_result_{}", auditor_group_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(joined: u64) -> ElectionInfo {
        ElectionInfo {
            joined_version: joined,
            stake: 10,
            comprehensive_stake: 10,
            consensus_public_key: PublicKey([3u8; 32]),
        }
    }

    #[test]
    fn test_nested_access() {
        let mut store = ElectionResultStore::default();
        let net = NetworkId(255);
        let group = store
            .result_of(net)
            .result_of(NodeType::ConsensusAuditor)
            .result_of(ClusterId(1))
            .result_of(GroupId(1));
        group.insert(NodeId::from("a"), info(0));
        group.group_version = Some(0);

        let read = store
            .group(net, NodeType::ConsensusAuditor, ClusterId(1), GroupId(1))
            .unwrap();
        assert_eq!(read.len(), 1);
        assert!(read.contains(&NodeId::from("a")));
        assert!(store
            .group(net, NodeType::ConsensusValidator, ClusterId(1), GroupId(64))
            .is_none());
    }

    #[test]
    fn test_empty_ignores_memberless_groups() {
        let mut store = ElectionResultStore::default();
        assert!(store.is_empty());
        store
            .result_of(NetworkId(1))
            .result_of(NodeType::ConsensusValidator)
            .result_of(ClusterId(1))
            .result_of(GroupId(64));
        assert!(store.is_empty());
        store
            .result_of(NetworkId(1))
            .result_of(NodeType::ConsensusValidator)
            .result_of(ClusterId(1))
            .result_of(GroupId(64))
            .insert(NodeId::from("v"), info(3));
        assert!(!store.is_empty());
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut store = ElectionResultStore::default();
        let empty = store.digest().unwrap();
        store
            .result_of(NetworkId(1))
            .result_of(NodeType::ConsensusAuditor)
            .result_of(ClusterId(1))
            .result_of(GroupId(1))
            .insert(NodeId::from("a"), info(0));
        assert_ne!(store.digest().unwrap(), empty);
        assert_eq!(store.digest().unwrap(), store.clone().digest().unwrap());
    }

    #[test]
    fn test_property_names_are_per_group() {
        assert_eq!(election_result_property_name(GroupId(1)), "election_result_1");
        assert_ne!(
            election_result_property_name(GroupId(1)),
            election_result_property_name(GroupId(2))
        );
    }
}
