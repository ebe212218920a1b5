//! Group elector
//!
//! Selects one group's committee from its effective standby pool. Selection
//! is a pure function of the pool, the seed and the group coordinates, so
//! every replica derives the same committee.

use std::collections::BTreeMap;
use tracing::debug;

use super::{AssociationClusterResult, ClusterElectionStores, ElectionGroupResult, ElectionInfo};
use crate::config::{GovernanceParams, SelectionPolicy, SizeRange};
use crate::crypto::SeedStream;
use crate::standby::{StandbyNetworkResult, StandbyNodeInfo, StandbyPool};
use crate::types::{ClusterId, GroupId, LogicTime, NetworkId, NodeId, NodeType, ZoneId};

/// Coordinates and inputs of one group election
#[derive(Debug, Clone)]
pub struct GroupElection {
    pub zone: ZoneId,
    pub cluster: ClusterId,
    pub group_id: GroupId,
    pub node_type: NodeType,
    pub election_time: LogicTime,
    pub start_time: LogicTime,
    pub random_seed: u64,
    pub size_range: SizeRange,
    pub policy: SelectionPolicy,
    pub committee_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupElectionOutcome {
    /// The group was re-elected; its version always advances
    Elected {
        version: u64,
        size: usize,
        membership_changed: bool,
    },
    /// Fewer eligible candidates than the minimum group size; group untouched
    InsufficientCandidates { available: usize, required: u16 },
}

impl GroupElectionOutcome {
    pub fn is_elected(&self) -> bool {
        matches!(self, GroupElectionOutcome::Elected { .. })
    }
}

fn node_type_tag(node_type: NodeType) -> u8 {
    match node_type {
        NodeType::Rec => 0,
        NodeType::Zec => 1,
        NodeType::Archive => 2,
        NodeType::ConsensusAuditor => 3,
        NodeType::ConsensusValidator => 4,
        NodeType::Edge => 5,
    }
}

/// Elect `group` from `pool`.
///
/// Candidates with zero stake in the target role are ignored. Members that
/// are re-selected keep their `joined_version`.
pub fn elect_group(request: &GroupElection, pool: &StandbyPool, group: &mut ElectionGroupResult) -> GroupElectionOutcome {
    let candidates: Vec<(&NodeId, &StandbyNodeInfo, u64)> = pool
        .iter()
        .map(|(id, info)| (id, info, info.stake(request.node_type)))
        .filter(|(_, _, stake)| *stake > 0)
        .collect();

    if candidates.len() < request.size_range.min as usize {
        debug!(
            group = %request.group_id,
            available = candidates.len(),
            required = request.size_range.min,
            "Not enough candidates, group kept"
        );
        return GroupElectionOutcome::InsufficientCandidates {
            available: candidates.len(),
            required: request.size_range.min,
        };
    }

    let target = candidates.len().min(request.size_range.max as usize);
    let time_bytes = request.election_time.to_le_bytes();
    let mut stream = SeedStream::new(
        request.random_seed,
        &[
            &b"elect_group"[..],
            &[request.zone.0],
            &[request.cluster.0],
            &[request.group_id.0],
            &[node_type_tag(request.node_type)],
            &time_bytes,
        ],
    );
    let selected = match request.policy {
        SelectionPolicy::StakeWeighted => select_weighted(candidates, target, &mut stream),
        SelectionPolicy::Uniform => select_uniform(candidates, target, &mut stream),
    };

    let version = group.group_version.map_or(0, |v| v + 1);
    let members: BTreeMap<NodeId, ElectionInfo> = selected
        .into_iter()
        .map(|(id, info, stake)| {
            let joined_version = group.get(id).map_or(version, |prev| prev.joined_version);
            let election_info = ElectionInfo {
                joined_version,
                stake,
                comprehensive_stake: stake,
                consensus_public_key: info.consensus_public_key.clone(),
            };
            (id.clone(), election_info)
        })
        .collect();

    let membership_changed = !members.keys().eq(group.node_ids());
    let size = members.len();
    group.set_members(members);
    group.group_version = Some(version);
    group.election_committee_version = Some(request.committee_version);
    group.timestamp = request.election_time;
    group.start_time = request.start_time;

    debug!(
        group = %request.group_id,
        node_type = %request.node_type,
        version,
        size,
        membership_changed,
        "Group elected"
    );
    GroupElectionOutcome::Elected {
        version,
        size,
        membership_changed,
    }
}

/// Draw `target` candidates without replacement, each draw proportional to stake
fn select_weighted<'a>(
    mut remaining: Vec<(&'a NodeId, &'a StandbyNodeInfo, u64)>,
    target: usize,
    stream: &mut SeedStream,
) -> Vec<(&'a NodeId, &'a StandbyNodeInfo, u64)> {
    let mut selected = Vec::with_capacity(target);
    while selected.len() < target && !remaining.is_empty() {
        let total: u128 = remaining.iter().map(|(_, _, stake)| *stake as u128).sum();
        let point = draw_below(stream, total);
        let mut cumulative = 0u128;
        let mut index = remaining.len() - 1;
        for (i, (_, _, stake)) in remaining.iter().enumerate() {
            cumulative += *stake as u128;
            if point < cumulative {
                index = i;
                break;
            }
        }
        selected.push(remaining.remove(index));
    }
    selected
}

fn select_uniform<'a>(
    mut remaining: Vec<(&'a NodeId, &'a StandbyNodeInfo, u64)>,
    target: usize,
    stream: &mut SeedStream,
) -> Vec<(&'a NodeId, &'a StandbyNodeInfo, u64)> {
    let mut selected = Vec::with_capacity(target);
    while selected.len() < target && !remaining.is_empty() {
        let index = stream.next_below(remaining.len() as u64) as usize;
        selected.push(remaining.remove(index));
    }
    selected
}

/// Uniform point in `[0, bound)` for a stake total that may exceed 64 bits
fn draw_below(stream: &mut SeedStream, bound: u128) -> u128 {
    match u64::try_from(bound) {
        Ok(b) => stream.next_below(b) as u128,
        Err(_) => {
            let wide = ((stream.next_u64() as u128) << 64) | stream.next_u64() as u128;
            wide % bound
        }
    }
}

fn remove_members(pool: &mut StandbyPool, group: Option<&super::ElectionGroupResult>) {
    if let Some(group) = group {
        for node_id in group.node_ids() {
            pool.remove(node_id);
        }
    }
}

/// Auditor candidates for `auditor_group`: the auditor standby pool minus
/// members of its associated validator groups and of every other auditor group.
pub fn effective_auditor_pool(
    standby: &StandbyNetworkResult,
    network_id: NetworkId,
    cluster: ClusterId,
    auditor_group: GroupId,
    associated_validators: &[GroupId],
    stores: &ClusterElectionStores,
    params: &GovernanceParams,
) -> StandbyPool {
    let mut pool = standby.result_of(NodeType::ConsensusAuditor);
    let before = pool.len();

    if let Some(own) = stores.get(&auditor_group) {
        for validator_group in associated_validators {
            remove_members(
                &mut pool,
                own.group(network_id, NodeType::ConsensusValidator, cluster, *validator_group),
            );
        }
    }

    for i in 0..params.auditor_group_count {
        let other = GroupId::auditor(i);
        if other == auditor_group {
            continue;
        }
        if let Some(store) = stores.get(&other) {
            remove_members(&mut pool, store.group(network_id, NodeType::ConsensusAuditor, cluster, other));
        }
    }

    debug!(group = %auditor_group, before, after = pool.len(), "Auditor standbys filtered");
    pool
}

/// Validator candidates for `validator_group`, supervised by `auditor_group`:
/// the validator standby pool minus members of that auditor group and of
/// every other validator group.
#[allow(clippy::too_many_arguments)]
pub fn effective_validator_pool(
    standby: &StandbyNetworkResult,
    network_id: NetworkId,
    cluster: ClusterId,
    validator_group: GroupId,
    auditor_group: GroupId,
    association: &AssociationClusterResult,
    stores: &ClusterElectionStores,
    params: &GovernanceParams,
) -> StandbyPool {
    let mut pool = standby.result_of(NodeType::ConsensusValidator);
    let before = pool.len();

    if let Some(own) = stores.get(&auditor_group) {
        remove_members(
            &mut pool,
            own.group(network_id, NodeType::ConsensusAuditor, cluster, auditor_group),
        );
    }

    for i in 0..params.validator_group_count {
        let other = GroupId::validator(i);
        if other == validator_group {
            continue;
        }
        let supervisor = match association.auditor_of(other) {
            Some(a) => a,
            None => continue,
        };
        if let Some(store) = stores.get(&supervisor) {
            remove_members(&mut pool, store.group(network_id, NodeType::ConsensusValidator, cluster, other));
        }
    }

    debug!(group = %validator_group, before, after = pool.len(), "Validator standbys filtered");
    pool
}
