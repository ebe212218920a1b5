//! Validator-to-auditor group association
//!
//! Every validator group in a cluster is supervised by exactly one auditor
//! group. The association contract builds the table once from governance
//! counts; the election contract only reads it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::config::GovernanceParams;
use crate::error::ContractError;
use crate::storage::{load_prop, save_prop, PropertyStore, StorageError};
use crate::types::{Address, ClusterId, GroupId, DEFAULT_CLUSTER_ID, ZEC_GROUP_ASSOC_ADDR};

/// String property holding the serialized [`AssociationResultStore`]
pub const GROUP_ASSOC_KEY: &str = "group_association";

/// Association table of one cluster: validator group -> auditor group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationClusterResult {
    pub cluster_version: Option<u64>,
    associations: BTreeMap<GroupId, GroupId>,
}

impl AssociationClusterResult {
    /// Default table: validator `i` is supervised by auditor `i / fan_out`
    pub fn build(params: &GovernanceParams) -> Self {
        let fan_out = params.validator_fan_out().max(1);
        let associations = (0..params.validator_group_count)
            .map(|i| (GroupId::validator(i), GroupId::auditor(i / fan_out)))
            .collect();
        Self {
            cluster_version: Some(0),
            associations,
        }
    }

    pub fn insert(&mut self, validator: GroupId, auditor: GroupId) {
        self.associations.insert(validator, auditor);
    }

    pub fn auditor_of(&self, validator: GroupId) -> Option<GroupId> {
        self.associations.get(&validator).copied()
    }

    /// Validator groups supervised by `auditor`, in id order
    pub fn validators_of(&self, auditor: GroupId) -> Vec<GroupId> {
        self.associations
            .iter()
            .filter(|(_, a)| **a == auditor)
            .map(|(v, _)| *v)
            .collect()
    }

    /// `(validator, auditor)` pairs in validator id order
    pub fn iter(&self) -> impl Iterator<Item = (GroupId, GroupId)> + '_ {
        self.associations.iter().map(|(v, a)| (*v, *a))
    }

    pub fn len(&self) -> usize {
        self.associations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }

    /// Check the table covers every governed group with in-range ids
    pub fn validate(&self, params: &GovernanceParams) -> Result<(), String> {
        for i in 0..params.validator_group_count {
            let validator = GroupId::validator(i);
            match self.auditor_of(validator) {
                None => return Err(format!("validator group {} has no auditor", validator)),
                Some(a) if !a.is_auditor() || a.0 >= GroupId::auditor(params.auditor_group_count).0 => {
                    return Err(format!("validator group {} maps to unknown auditor {}", validator, a))
                }
                Some(_) => {}
            }
        }
        if self.associations.keys().any(|v| !v.is_validator()) {
            return Err("association key is not a validator group".to_string());
        }
        for i in 0..params.auditor_group_count {
            if self.validators_of(GroupId::auditor(i)).is_empty() {
                return Err(format!("auditor group {} supervises nothing", GroupId::auditor(i)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationResultStore {
    clusters: BTreeMap<ClusterId, AssociationClusterResult>,
}

impl AssociationResultStore {
    pub fn result_of(&self, cluster_id: ClusterId) -> Option<&AssociationClusterResult> {
        self.clusters.get(&cluster_id)
    }

    pub fn result_of_mut(&mut self, cluster_id: ClusterId) -> &mut AssociationClusterResult {
        self.clusters.entry(cluster_id).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.values().all(|c| c.is_empty())
    }
}

pub struct GroupAssocContract {
    address: Address,
}

impl Default for GroupAssocContract {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupAssocContract {
    pub fn new() -> Self {
        Self {
            address: Address::from(ZEC_GROUP_ASSOC_ADDR),
        }
    }

    /// Build and persist the default association of the consensus cluster
    pub fn setup<S: PropertyStore + ?Sized>(&self, store: &mut S, params: &GovernanceParams) -> Result<(), ContractError> {
        let cluster = AssociationClusterResult::build(params);
        cluster.validate(params).map_err(|reason| {
            ContractError::GovernanceViolation(crate::config::ConfigError::Invalid {
                key: crate::config::VALIDATOR_GROUP_COUNT,
                reason,
            })
        })?;

        let mut assoc = AssociationResultStore::default();
        *assoc.result_of_mut(DEFAULT_CLUSTER_ID) = cluster;
        store.string_create(&self.address, GROUP_ASSOC_KEY)?;
        save_prop(store, &self.address, GROUP_ASSOC_KEY, &assoc)?;
        info!(
            validators = params.validator_group_count,
            auditors = params.auditor_group_count,
            "Group association set up"
        );
        Ok(())
    }

    pub fn load<S: PropertyStore + ?Sized>(&self, store: &S) -> Result<AssociationResultStore, StorageError> {
        load_prop(store, &self.address, GROUP_ASSOC_KEY)
    }
}
