//! Rotation scheduler: the consensus election contract
//!
//! On each timer tick the contract decides which auditor groups are due for
//! rotation and re-elects each due auditor group together with its
//! associated validator groups. Every auditor group's results live in their
//! own property; only the properties of groups that elected are rewritten.

use tracing::{debug, info, warn};

use super::{
    effective_auditor_pool, effective_validator_pool, elect_group, election_result_property_name,
    AssociationClusterResult, AssociationResultStore, ClusterElectionStores, ElectionResultStore, GenesisBootstrap,
    GroupAssocContract, GroupElection, GroupElectionOutcome, StaticConsensusBootstrap, ELECTION_EXECUTED_KEY,
};
use crate::chain::ChainReader;
use crate::config::{GovernanceParams, SizeRange};
use crate::context::{ContractContext, SkipReason, TickOutcome};
use crate::crypto::seed_from_bytes;
use crate::error::ContractError;
use crate::standby::{ensure_self_invoked, read_standby_snapshot, StandbyNetworkResult};
use crate::storage::{load_prop, save_prop, PropertyStore};
use crate::types::{
    Address, ClusterId, GroupId, LogicTime, NetworkId, NodeType, ZoneId, CONSENSUS_ZONE_ID, DEFAULT_CLUSTER_ID,
    ZEC_ELECT_CONSENSUS_ADDR,
};

/// Committee version stamped on groups elected by this contract
pub const ELECTION_COMMITTEE_VERSION: u64 = 0;

/// Logical time a non-empty group must have served before rotating.
///
/// The due time wobbles around the election interval by a seed-derived
/// offset so that groups do not all rotate on the same tick.
pub fn rotation_due(params: &GovernanceParams, index: u16, random_seed: u64) -> i64 {
    let wave_range = params.total_group_count() + index as u64;
    let wave_offset = (random_seed % wave_range) as i64 - (wave_range / 2) as i64;
    wave_offset + params.cluster_election_interval as i64
}

/// Whether a group last elected at `group_timestamp` is due at `election_time`
pub fn is_rotation_due(
    params: &GovernanceParams,
    index: u16,
    random_seed: u64,
    group_timestamp: LogicTime,
    election_time: LogicTime,
) -> bool {
    let served = election_time as i128 - group_timestamp as i128;
    served >= rotation_due(params, index, random_seed) as i128
}

/// Inputs of one cluster election tick
#[derive(Debug, Clone, Copy)]
pub struct ElectionRound {
    pub network_id: NetworkId,
    pub zone: ZoneId,
    pub cluster: ClusterId,
    pub random_seed: u64,
    pub election_time: LogicTime,
}

/// Per auditor group result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub auditor_group: GroupId,
    pub auditor: GroupElectionOutcome,
    pub validators: Vec<(GroupId, GroupElectionOutcome)>,
}

impl RotationReport {
    /// Any group under this auditor elected
    pub fn succeeded(&self) -> bool {
        self.auditor.is_elected() || self.validators.iter().any(|(_, o)| o.is_elected())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectionReport {
    /// Auditor groups whose election succeeded, in id order
    pub rotated: Vec<RotationReport>,
    /// Auditor groups that were due but elected nothing
    pub failed: Vec<GroupId>,
    /// Whether this tick completed the genesis election
    pub genesis_completed: bool,
}

impl ElectionReport {
    pub fn rotated_groups(&self) -> Vec<GroupId> {
        self.rotated.iter().map(|r| r.auditor_group).collect()
    }
}

/// Elect `auditor_group` and then each of its validator groups.
///
/// Succeeds if any of those groups elected; on success every associated
/// validator group is stamped with the auditor's current version.
#[allow(clippy::too_many_arguments)]
pub fn elect_auditor_validator(
    round: &ElectionRound,
    params: &GovernanceParams,
    auditor_group: GroupId,
    start_time: LogicTime,
    association: &AssociationClusterResult,
    standby: &StandbyNetworkResult,
    stores: &mut ClusterElectionStores,
) -> Result<RotationReport, ContractError> {
    let validator_groups = association.validators_of(auditor_group);
    if validator_groups.is_empty() {
        return Err(ContractError::NoAssociatedValidators(auditor_group));
    }

    let request = |group_id: GroupId, node_type: NodeType, size_range: SizeRange| GroupElection {
        zone: round.zone,
        cluster: round.cluster,
        group_id,
        node_type,
        election_time: round.election_time,
        start_time,
        random_seed: round.random_seed,
        size_range,
        policy: params.selection_policy,
        committee_version: ELECTION_COMMITTEE_VERSION,
    };

    let auditor_pool = effective_auditor_pool(
        standby,
        round.network_id,
        round.cluster,
        auditor_group,
        &validator_groups,
        stores,
        params,
    );
    let auditor_outcome = {
        let group = stores
            .entry(auditor_group)
            .or_default()
            .result_of(round.network_id)
            .result_of(NodeType::ConsensusAuditor)
            .result_of(round.cluster)
            .result_of(auditor_group);
        elect_group(
            &request(auditor_group, NodeType::ConsensusAuditor, params.auditor_size_range()),
            &auditor_pool,
            group,
        )
    };
    if !auditor_outcome.is_elected() {
        warn!(group = %auditor_group, outcome = ?auditor_outcome, "Auditor group unchanged");
    }

    let mut validators = Vec::with_capacity(validator_groups.len());
    for validator_group in &validator_groups {
        let pool = effective_validator_pool(
            standby,
            round.network_id,
            round.cluster,
            *validator_group,
            auditor_group,
            association,
            stores,
            params,
        );
        let group = stores
            .entry(auditor_group)
            .or_default()
            .result_of(round.network_id)
            .result_of(NodeType::ConsensusValidator)
            .result_of(round.cluster)
            .result_of(*validator_group);
        let outcome = elect_group(
            &request(*validator_group, NodeType::ConsensusValidator, params.validator_size_range()),
            &pool,
            group,
        );
        if !outcome.is_elected() {
            warn!(group = %validator_group, auditor = %auditor_group, outcome = ?outcome, "Validator group unchanged");
        }
        validators.push((*validator_group, outcome));
    }

    let report = RotationReport {
        auditor_group,
        auditor: auditor_outcome,
        validators,
    };

    if report.succeeded() {
        let network = stores.entry(auditor_group).or_default().result_of(round.network_id);
        let auditor_version = network
            .result_of(NodeType::ConsensusAuditor)
            .result_of(round.cluster)
            .result_of(auditor_group)
            .group_version;
        for validator_group in &validator_groups {
            let group = network
                .result_of(NodeType::ConsensusValidator)
                .result_of(round.cluster)
                .result_of(*validator_group);
            group.associated_group_id = Some(auditor_group);
            group.cluster_version = association.cluster_version;
            group.associated_group_version = auditor_version;
        }
    }
    Ok(report)
}

/// Run one cluster's rotation over in-memory stores.
///
/// Mutates `stores` and `genesis` only; the caller persists them.
pub fn elect_cluster(
    round: &ElectionRound,
    params: &GovernanceParams,
    standby: &StandbyNetworkResult,
    association: &AssociationClusterResult,
    stores: &mut ClusterElectionStores,
    genesis: &mut GenesisBootstrap,
) -> Result<ElectionReport, ContractError> {
    let cap = genesis.rotation_cap(params);
    let start_time = genesis.start_time(params, round.election_time);
    let was_completed = genesis.is_completed();
    let mut report = ElectionReport::default();

    for index in 0..params.auditor_group_count {
        if report.rotated.len() >= cap as usize {
            break;
        }
        let auditor_group = GroupId::auditor(index);
        let current = stores
            .get(&auditor_group)
            .and_then(|s| s.group(round.network_id, NodeType::ConsensusAuditor, round.cluster, auditor_group));

        let due = match current {
            Some(group) if !group.is_empty() => {
                is_rotation_due(params, index, round.random_seed, group.timestamp, round.election_time)
            }
            _ => true,
        };
        if !due {
            debug!(
                zone = round.zone.0,
                cluster = round.cluster.0,
                group = %auditor_group,
                rotation_due = rotation_due(params, index, round.random_seed),
                "Not this rotation"
            );
            continue;
        }

        let rotation = elect_auditor_validator(round, params, auditor_group, start_time, association, standby, stores)?;
        if rotation.succeeded() {
            genesis.record_elected();
            info!(
                zone = round.zone.0,
                cluster = round.cluster.0,
                group = %auditor_group,
                "Auditor group rotation succeeded"
            );
            report.rotated.push(rotation);
        } else {
            warn!(
                zone = round.zone.0,
                cluster = round.cluster.0,
                group = %auditor_group,
                "Auditor group rotation failed"
            );
            report.failed.push(auditor_group);
        }
    }

    if !was_completed {
        genesis.verify_and_complete(round.network_id, round.cluster, association, stores)?;
        report.genesis_completed = true;
    }
    Ok(report)
}

/// The consensus group election contract
pub struct ElectConsensusContract {
    network_id: NetworkId,
    address: Address,
    params: GovernanceParams,
    static_bootstrap: Option<StaticConsensusBootstrap>,
}

impl ElectConsensusContract {
    pub fn new(network_id: NetworkId, params: GovernanceParams) -> Self {
        Self {
            network_id,
            address: Address::from(ZEC_ELECT_CONSENSUS_ADDR),
            params,
            static_bootstrap: None,
        }
    }

    /// Replace randomized elections with a fixed first round
    pub fn with_static_bootstrap(mut self, bootstrap: StaticConsensusBootstrap) -> Self {
        self.static_bootstrap = Some(bootstrap);
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn params(&self) -> &GovernanceParams {
        &self.params
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    /// Create an empty result property per auditor group and the genesis flag
    pub fn setup<S: PropertyStore + ?Sized>(&self, store: &mut S) -> Result<(), ContractError> {
        let empty = ElectionResultStore::default();
        for index in 0..self.params.auditor_group_count {
            let property = election_result_property_name(GroupId::auditor(index));
            save_prop(store, &self.address, &property, &empty)?;
        }
        store.string_create(&self.address, ELECTION_EXECUTED_KEY)?;
        info!(auditor_groups = self.params.auditor_group_count, "Election contract set up");
        Ok(())
    }

    /// Every auditor group's stored results
    pub fn load_stores<S: PropertyStore + ?Sized>(&self, store: &S) -> Result<ClusterElectionStores, ContractError> {
        let mut stores = ClusterElectionStores::new();
        for index in 0..self.params.auditor_group_count {
            let gid = GroupId::auditor(index);
            let result: ElectionResultStore = load_prop(store, &self.address, &election_result_property_name(gid))?;
            stores.insert(gid, result);
        }
        Ok(stores)
    }

    pub fn on_timer<S, C, X>(
        &mut self,
        ctx: &X,
        store: &mut S,
        chain: &C,
        current_time: LogicTime,
    ) -> Result<TickOutcome<ElectionReport>, ContractError>
    where
        S: PropertyStore + ?Sized,
        C: ChainReader + ?Sized,
        X: ContractContext,
    {
        if let Some(bootstrap) = self.static_bootstrap.as_mut() {
            let outcome = bootstrap.on_timer(
                store,
                chain,
                &self.address,
                self.network_id,
                &self.params,
                ctx.wall_clock_ms(),
                current_time,
            )?;
            return Ok(match outcome {
                TickOutcome::Committed(_) => TickOutcome::Committed(ElectionReport::default()),
                TickOutcome::Skipped(reason) => TickOutcome::Skipped(reason),
            });
        }

        ensure_self_invoked(ctx, &self.address)?;
        self.params.validate()?;

        let now = ctx.consensus_time();
        if current_time > now {
            warn!(tick = current_time, now, "Election tick ahead of consensus time");
            return Ok(TickOutcome::Skipped(SkipReason::FutureTick { tick: current_time, now }));
        }
        if current_time + self.params.cluster_election_interval / 2 <= now {
            warn!(tick = current_time, now, "Election tick retried too many times");
            return Ok(TickOutcome::Skipped(SkipReason::RetriedTooManyTimes { tick: current_time, now }));
        }

        let random_seed = match ctx.random_seed() {
            Ok(bytes) => seed_from_bytes(&bytes),
            Err(e) => {
                warn!(error = %e, "Get random seed failed");
                return Ok(TickOutcome::Skipped(SkipReason::SeedUnavailable(e.0)));
            }
        };

        self.elect(store, chain, CONSENSUS_ZONE_ID, DEFAULT_CLUSTER_ID, random_seed, current_time)
    }

    pub fn elect<S, C>(
        &self,
        store: &mut S,
        chain: &C,
        zone: ZoneId,
        cluster: ClusterId,
        random_seed: u64,
        election_time: LogicTime,
    ) -> Result<TickOutcome<ElectionReport>, ContractError>
    where
        S: PropertyStore + ?Sized,
        C: ChainReader + ?Sized,
    {
        let standby = match read_standby_snapshot(store, chain, self.network_id)? {
            Some(standby) => standby,
            None => return Ok(TickOutcome::Skipped(SkipReason::NoStandbySnapshot)),
        };
        info!(
            zone = zone.0,
            cluster = cluster.0,
            random_seed,
            logic_time = election_time,
            "Electing"
        );
        if standby.is_empty() {
            warn!("No standby nodes");
            return Ok(TickOutcome::Skipped(SkipReason::NoStandbyNodes));
        }

        let association_store: AssociationResultStore = GroupAssocContract::new().load(store)?;
        let association = match association_store.result_of(cluster) {
            Some(a) if !a.is_empty() => a.clone(),
            _ => {
                warn!("No association info");
                return Ok(TickOutcome::Skipped(SkipReason::NoAssociation));
            }
        };

        let mut genesis = GenesisBootstrap::load(store, &self.address)?;
        let mut stores = self.load_stores(store)?;
        let round = ElectionRound {
            network_id: self.network_id,
            zone,
            cluster,
            random_seed,
            election_time,
        };
        let report = elect_cluster(&round, &self.params, &standby, &association, &mut stores, &mut genesis)?;

        for rotation in &report.rotated {
            if let Some(result) = stores.get(&rotation.auditor_group) {
                save_prop(
                    store,
                    &self.address,
                    &election_result_property_name(rotation.auditor_group),
                    result,
                )?;
                debug!(group = %rotation.auditor_group, digest = %result.digest()?, "Election result stored");
            }
        }
        genesis.persist(store, &self.address)?;
        Ok(TickOutcome::Committed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionPolicy;
    use crate::crypto::PublicKey;
    use crate::standby::{StandbyNetworkStorageResult, StandbyNodeInfo};
    use crate::types::NodeId;

    fn params() -> GovernanceParams {
        GovernanceParams {
            auditor_group_count: 2,
            validator_group_count: 4,
            min_auditor_group_size: 2,
            max_auditor_group_size: 3,
            min_validator_group_size: 2,
            max_validator_group_size: 3,
            selection_policy: SelectionPolicy::StakeWeighted,
            ..GovernanceParams::default()
        }
    }

    fn standby(count: usize) -> StandbyNetworkResult {
        let mut storage = StandbyNetworkStorageResult::default();
        for i in 0..count {
            storage.insert(
                NodeId::new(format!("node{:03}", i)),
                StandbyNodeInfo {
                    consensus_public_key: PublicKey([i as u8; 32]),
                    stake_container: [(NodeType::ConsensusAuditor, 10 + i as u64), (NodeType::ConsensusValidator, 10)]
                        .into_iter()
                        .collect(),
                    program_version: "1.0.0".to_string(),
                    is_genesis_node: false,
                },
            );
        }
        storage.network_result()
    }

    fn round(seed: u64, time: LogicTime) -> ElectionRound {
        ElectionRound {
            network_id: NetworkId(255),
            zone: CONSENSUS_ZONE_ID,
            cluster: DEFAULT_CLUSTER_ID,
            random_seed: seed,
            election_time: time,
        }
    }

    fn fresh_genesis() -> GenesisBootstrap {
        GenesisBootstrap::load(&crate::storage::MemoryStore::new(), &Address::from(ZEC_ELECT_CONSENSUS_ADDR)).unwrap()
    }

    #[test]
    fn test_rotation_due_formula() {
        let p = params();
        // total = 6, index 0: range 6, offset = seed % 6 - 3
        assert_eq!(rotation_due(&p, 0, 0), 360 - 3);
        assert_eq!(rotation_due(&p, 0, 5), 360 + 2);
        // index 1: range 7, offset = seed % 7 - 3
        assert_eq!(rotation_due(&p, 1, 13), 360 + 3);

        assert!(is_rotation_due(&p, 0, 0, 100, 100 + 357));
        assert!(!is_rotation_due(&p, 0, 0, 100, 100 + 356));
        // clocks never run backwards into a due rotation
        assert!(!is_rotation_due(&p, 0, 0, 500, 100));
    }

    #[test]
    fn test_genesis_elects_all_pairs() {
        let p = params();
        let association = AssociationClusterResult::build(&p);
        let mut stores = ClusterElectionStores::new();
        let mut genesis = fresh_genesis();

        let report = elect_cluster(&round(42, 10), &p, &standby(40), &association, &mut stores, &mut genesis).unwrap();
        assert_eq!(report.rotated_groups(), vec![GroupId(1), GroupId(2)]);
        assert!(report.genesis_completed);
        assert!(genesis.is_completed());

        for (validator, auditor) in association.iter() {
            let store = &stores[&auditor];
            let v = store
                .group(NetworkId(255), NodeType::ConsensusValidator, DEFAULT_CLUSTER_ID, validator)
                .unwrap();
            assert!(!v.is_empty());
            assert_eq!(v.associated_group_id, Some(auditor));
            assert_eq!(v.start_time, 10);
        }
    }

    #[test]
    fn test_missing_association_is_fatal() {
        let p = params();
        let mut association = AssociationClusterResult::build(&p);
        association.insert(GroupId(64), GroupId(2));
        association.insert(GroupId(65), GroupId(2));
        let mut stores = ClusterElectionStores::new();
        let mut genesis = fresh_genesis();

        let err = elect_cluster(&round(1, 10), &p, &standby(40), &association, &mut stores, &mut genesis).unwrap_err();
        assert!(matches!(err, ContractError::NoAssociatedValidators(GroupId(1))));
    }

    #[test]
    fn test_small_pool_fails_genesis() {
        let p = params();
        let association = AssociationClusterResult::build(&p);
        let mut stores = ClusterElectionStores::new();
        let mut genesis = fresh_genesis();

        // enough for auditors but not for four validator groups
        let err = elect_cluster(&round(1, 10), &p, &standby(7), &association, &mut stores, &mut genesis).unwrap_err();
        assert!(matches!(err, ContractError::GenesisIncomplete { .. }));
        assert!(!genesis.is_completed());
    }

    #[test]
    fn test_steady_state_respects_cap_and_schedule() {
        let mut p = params();
        p.max_auditor_rotation_count = 1;
        let association = AssociationClusterResult::build(&p);
        let mut stores = ClusterElectionStores::new();
        let mut genesis = fresh_genesis();
        elect_cluster(&round(7, 10), &p, &standby(40), &association, &mut stores, &mut genesis).unwrap();

        // far too early: nothing is due
        let early = elect_cluster(&round(7, 20), &p, &standby(40), &association, &mut stores, &mut genesis).unwrap();
        assert!(early.rotated.is_empty());
        assert!(!early.genesis_completed);

        // both due, only one may rotate
        let late = elect_cluster(&round(7, 10_000), &p, &standby(40), &association, &mut stores, &mut genesis).unwrap();
        assert_eq!(late.rotated_groups(), vec![GroupId(1)]);

        let auditor = stores[&GroupId(1)]
            .group(NetworkId(255), NodeType::ConsensusAuditor, DEFAULT_CLUSTER_ID, GroupId(1))
            .unwrap();
        assert_eq!(auditor.group_version, Some(1));
        assert_eq!(auditor.start_time, 10_000 + p.cluster_election_interval / 2);
        let untouched = stores[&GroupId(2)]
            .group(NetworkId(255), NodeType::ConsensusAuditor, DEFAULT_CLUSTER_ID, GroupId(2))
            .unwrap();
        assert_eq!(untouched.group_version, Some(0));
    }
}
