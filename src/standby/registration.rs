//! Registration records read from the registration contract
//!
//! The registration contract owns these; the standby pool only reads them.
//! `register_node` / `deregister_node` write them directly for the node
//! binary and tests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::crypto::PublicKey;
use crate::storage::{PropertyStore, StorageError};
use crate::types::{Address, LogicTime, NetworkId, NodeId, NodeType, REC_REGISTRATION_ADDR};

/// Map property of the registration contract: node id -> record
pub const REGISTRATION_KEY: &str = "registered_nodes";

/// String property of the registration contract holding the activation record
pub const ACTIVATION_KEY: &str = "genesis_stage";

/// Role a node asked for when registering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleType {
    Invalid,
    Edge,
    /// Eligible for every consensus role
    Advance,
    Validator,
    Archive,
}

impl RoleType {
    /// Node types a registration in this role makes the node eligible for
    pub fn node_types(&self) -> &'static [NodeType] {
        match self {
            RoleType::Invalid => &[],
            RoleType::Edge => &[NodeType::Edge],
            RoleType::Advance => &[
                NodeType::Rec,
                NodeType::Zec,
                NodeType::Archive,
                NodeType::ConsensusAuditor,
                NodeType::ConsensusValidator,
            ],
            RoleType::Validator => &[NodeType::ConsensusValidator],
            RoleType::Archive => &[NodeType::Archive],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub role: RoleType,
    pub consensus_public_key: PublicKey,
    pub network_ids: BTreeSet<NetworkId>,
    /// Stake per node type as computed by the registration contract
    pub stakes: BTreeMap<NodeType, u64>,
    pub account_mortgage: u64,
    pub required_min_deposit: u64,
    pub is_genesis_node: bool,
}

impl RegistrationRecord {
    /// Stake container for every node type the role covers
    pub fn stake_container(&self) -> BTreeMap<NodeType, u64> {
        self.role
            .node_types()
            .iter()
            .map(|t| (*t, self.stakes.get(t).copied().unwrap_or(0)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub activated: bool,
    pub activation_time: LogicTime,
}

fn registration_addr() -> Address {
    Address::from(REC_REGISTRATION_ADDR)
}

/// All registration records, keyed by node id
pub fn read_registrations<S: PropertyStore + ?Sized>(
    store: &S,
) -> Result<BTreeMap<NodeId, RegistrationRecord>, StorageError> {
    let raw = store.map_copy(&registration_addr(), REGISTRATION_KEY)?;
    let mut records = BTreeMap::new();
    for (node_id, bytes) in raw {
        records.insert(NodeId::new(node_id), bincode::deserialize(&bytes)?);
    }
    Ok(records)
}

pub fn read_activation<S: PropertyStore + ?Sized>(store: &S) -> Result<ActivationRecord, StorageError> {
    crate::storage::load_prop(store, &registration_addr(), ACTIVATION_KEY)
}

pub fn register_node<S: PropertyStore + ?Sized>(
    store: &mut S,
    node_id: &NodeId,
    record: &RegistrationRecord,
) -> Result<(), StorageError> {
    let account = registration_addr();
    if !store.exists(&account, REGISTRATION_KEY)? {
        store.map_create(&account, REGISTRATION_KEY)?;
    }
    store.map_set(&account, REGISTRATION_KEY, node_id.as_str(), bincode::serialize(record)?)
}

pub fn deregister_node<S: PropertyStore + ?Sized>(store: &mut S, node_id: &NodeId) -> Result<bool, StorageError> {
    let account = registration_addr();
    let mut map = store.map_copy(&account, REGISTRATION_KEY)?;
    if map.remove(node_id.as_str()).is_none() {
        return Ok(false);
    }
    store.put(&account, REGISTRATION_KEY, crate::storage::Property::Map(map))?;
    Ok(true)
}

pub fn set_activation<S: PropertyStore + ?Sized>(
    store: &mut S,
    record: &ActivationRecord,
) -> Result<(), StorageError> {
    crate::storage::save_prop(store, &registration_addr(), ACTIVATION_KEY, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn record(role: RoleType) -> RegistrationRecord {
        RegistrationRecord {
            role,
            consensus_public_key: PublicKey([1u8; 32]),
            network_ids: [NetworkId(255)].into_iter().collect(),
            stakes: [(NodeType::ConsensusValidator, 40), (NodeType::ConsensusAuditor, 70)]
                .into_iter()
                .collect(),
            account_mortgage: 100,
            required_min_deposit: 10,
            is_genesis_node: false,
        }
    }

    #[test]
    fn test_stake_container_follows_role() {
        let validator = record(RoleType::Validator).stake_container();
        assert_eq!(validator.len(), 1);
        assert_eq!(validator[&NodeType::ConsensusValidator], 40);

        let advance = record(RoleType::Advance).stake_container();
        assert_eq!(advance.len(), 5);
        assert_eq!(advance[&NodeType::ConsensusAuditor], 70);
        assert_eq!(advance[&NodeType::Rec], 0);

        assert!(record(RoleType::Invalid).stake_container().is_empty());
    }

    #[test]
    fn test_register_and_deregister() {
        let mut store = MemoryStore::new();
        assert!(read_registrations(&store).unwrap().is_empty());

        let node = NodeId::from("T8node");
        register_node(&mut store, &node, &record(RoleType::Advance)).unwrap();
        let records = read_registrations(&store).unwrap();
        assert_eq!(records[&node].role, RoleType::Advance);

        assert!(deregister_node(&mut store, &node).unwrap());
        assert!(!deregister_node(&mut store, &node).unwrap());
        assert!(read_registrations(&store).unwrap().is_empty());
    }

    #[test]
    fn test_activation_defaults_to_inactive() {
        let mut store = MemoryStore::new();
        assert!(!read_activation(&store).unwrap().activated);
        set_activation(&mut store, &ActivationRecord { activated: true, activation_time: 9 }).unwrap();
        assert!(read_activation(&store).unwrap().activated);
    }
}
