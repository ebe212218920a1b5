//! End-to-end election scenarios over in-memory storage

use elect_core::chain::MemoryChain;
use elect_core::config::{GovernanceParams, SeedNodeConfig};
use elect_core::context::{InvocationContext, SkipReason, TickOutcome};
use elect_core::crypto::ConsensusKeypair;
use elect_core::election::{
    elect_cluster, rotation_due, AssociationClusterResult, ClusterElectionStores, ElectConsensusContract,
    ElectionRound, GenesisBootstrap, GenesisStage, GroupAssocContract,
};
use elect_core::error::ContractError;
use elect_core::runtime::{execute, NodeRuntime};
use elect_core::standby::{record_standby_height, StandbyNetworkStorageResult, StandbyNodeInfo, StandbyPoolContract};
use elect_core::storage::MemoryStore;
use elect_core::types::{
    Address, GroupId, LogicTime, NetworkId, NodeType, CONSENSUS_ZONE_ID, DEFAULT_CLUSTER_ID,
    ZEC_ELECT_CONSENSUS_ADDR,
};

const NET: NetworkId = NetworkId(255);

fn params(auditors: u16, validators: u16) -> GovernanceParams {
    GovernanceParams {
        auditor_group_count: auditors,
        validator_group_count: validators,
        min_auditor_group_size: 2,
        max_auditor_group_size: 3,
        min_validator_group_size: 2,
        max_validator_group_size: 3,
        ..GovernanceParams::default()
    }
}

fn seeds(count: u8) -> Vec<SeedNodeConfig> {
    (0..count)
        .map(|i| {
            let key = ConsensusKeypair::from_secret(&[i + 1; 32]).unwrap().public_key();
            SeedNodeConfig {
                node_id: key.node_id().0,
                public_key: key.to_hex(),
                stake: 10,
            }
        })
        .collect()
}

/// Standby pool, association and election contracts set up, with the
/// first standby snapshot published and recorded
fn deployed(p: &GovernanceParams, seed_count: u8) -> (MemoryStore, MemoryChain, ElectConsensusContract) {
    let mut store = MemoryStore::new();
    let mut chain = MemoryChain::new();
    let standby = StandbyPoolContract::new(NET);
    standby.setup(&mut store, &seeds(seed_count)).unwrap();
    let height = standby.publish_snapshot(&store, &mut chain, 0).unwrap();
    record_standby_height(&mut store, height).unwrap();
    GroupAssocContract::new().setup(&mut store, p).unwrap();
    let election = ElectConsensusContract::new(NET, p.clone());
    election.setup(&mut store).unwrap();
    (store, chain, election)
}

fn timer(now: LogicTime) -> InvocationContext {
    InvocationContext::timer(Address::from(ZEC_ELECT_CONSENSUS_ADDR), now, b"beacon".to_vec())
}

#[test]
fn scenario_genesis_with_four_auditor_groups() {
    let p = params(4, 8);
    let mut runtime = NodeRuntime::new(NET, p.clone(), MemoryStore::new(), MemoryChain::new());
    runtime.setup(&seeds(48)).unwrap();

    let mut elections = Vec::new();
    for _ in 0..4 {
        elections.extend(runtime.tick(0).unwrap().elections);
    }
    assert_eq!(elections.len(), 1);
    let report = elections.remove(0).committed().unwrap();
    assert!(report.genesis_completed);
    assert_eq!(report.rotated_groups(), vec![GroupId(1), GroupId(2), GroupId(3), GroupId(4)]);

    let stores = runtime.election().load_stores(runtime.store()).unwrap();
    let association = AssociationClusterResult::build(&p);
    for (validator, auditor) in association.iter() {
        let auditor_group = stores[&auditor]
            .group(NET, NodeType::ConsensusAuditor, DEFAULT_CLUSTER_ID, auditor)
            .unwrap();
        assert_eq!(auditor_group.group_version, Some(0));
        // genesis groups start immediately
        assert_eq!(auditor_group.start_time, 3);

        let validator_group = stores[&auditor]
            .group(NET, NodeType::ConsensusValidator, DEFAULT_CLUSTER_ID, validator)
            .unwrap();
        assert!((2..=3).contains(&validator_group.len()));
        assert_eq!(validator_group.associated_group_id, Some(auditor));
        assert_eq!(validator_group.associated_group_version, Some(0));
        assert!(validator_group.node_ids().all(|n| !auditor_group.contains(n)));
    }

    let genesis = GenesisBootstrap::load(runtime.store(), runtime.election().address()).unwrap();
    assert_eq!(genesis.stage(), GenesisStage::Completed);
}

#[test]
fn scenario_rotation_skips_group_not_due() {
    let p = params(2, 4);
    let association = AssociationClusterResult::build(&p);
    let mut storage = StandbyNetworkStorageResult::default();
    for i in 0..30u8 {
        let key = ConsensusKeypair::from_secret(&[i + 1; 32]).unwrap().public_key();
        storage.insert(
            key.node_id(),
            StandbyNodeInfo {
                consensus_public_key: key,
                stake_container: [(NodeType::ConsensusAuditor, 5), (NodeType::ConsensusValidator, 5)]
                    .into_iter()
                    .collect(),
                program_version: "1.0.0".to_string(),
                is_genesis_node: false,
            },
        );
    }
    let standby = storage.network_result();
    let mut stores = ClusterElectionStores::new();
    let mut genesis = GenesisBootstrap::load(&MemoryStore::new(), &Address::from(ZEC_ELECT_CONSENSUS_ADDR)).unwrap();

    let round = |seed: u64, election_time: LogicTime| ElectionRound {
        network_id: NET,
        zone: CONSENSUS_ZONE_ID,
        cluster: DEFAULT_CLUSTER_ID,
        random_seed: seed,
        election_time,
    };
    elect_cluster(&round(1, 10), &p, &standby, &association, &mut stores, &mut genesis).unwrap();

    // with 6 groups and seed 6: group 1 is due after 357, group 2 after 363
    let seed = 6;
    assert_eq!(rotation_due(&p, 0, seed), 357);
    assert_eq!(rotation_due(&p, 1, seed), 363);

    let report = elect_cluster(&round(seed, 10 + 357), &p, &standby, &association, &mut stores, &mut genesis).unwrap();
    assert_eq!(report.rotated_groups(), vec![GroupId(1)]);
    assert!(!report.genesis_completed);

    let version_of = |stores: &ClusterElectionStores, gid: GroupId| {
        stores[&gid]
            .group(NET, NodeType::ConsensusAuditor, DEFAULT_CLUSTER_ID, gid)
            .and_then(|g| g.group_version)
    };
    assert_eq!(version_of(&stores, GroupId(1)), Some(1));
    assert_eq!(version_of(&stores, GroupId(2)), Some(0));

    let report = elect_cluster(&round(seed, 10 + 363), &p, &standby, &association, &mut stores, &mut genesis).unwrap();
    assert_eq!(report.rotated_groups(), vec![GroupId(2)]);
}

#[test]
fn scenario_seed_failure_leaves_store_untouched() {
    let p = params(2, 4);
    let (mut store, chain, mut election) = deployed(&p, 30);
    let before = store.clone();

    let ctx = timer(100).without_seed("seed service down");
    let outcome = execute(&mut store, |s| election.on_timer(&ctx, s, &chain, 100)).unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Skipped(SkipReason::SeedUnavailable("seed service down".to_string()))
    );
    assert_eq!(store, before);
}

#[test]
fn scenario_failed_genesis_commits_nothing() {
    let p = params(2, 4);
    // enough for the auditors, too few for every validator group
    let (mut store, chain, mut election) = deployed(&p, 7);
    let before = store.clone();

    let result = execute(&mut store, |s| election.on_timer(&timer(100), s, &chain, 100));
    assert!(matches!(result, Err(ContractError::GenesisIncomplete { .. })));
    assert_eq!(store, before);

    let genesis = GenesisBootstrap::load(&store, election.address()).unwrap();
    assert_eq!(genesis.stage(), GenesisStage::NotStarted);
    let stores = election.load_stores(&store).unwrap();
    assert!(stores.values().all(|s| s.is_empty()));
}

#[test]
fn scenario_stale_and_future_ticks_are_skipped() {
    let p = params(2, 4);
    let (mut store, chain, mut election) = deployed(&p, 30);
    let before = store.clone();

    let future = election.on_timer(&timer(100), &mut store, &chain, 101).unwrap();
    assert_eq!(future, TickOutcome::Skipped(SkipReason::FutureTick { tick: 101, now: 100 }));

    // half an election interval late
    let now = 100 + p.cluster_election_interval / 2;
    let stale = election.on_timer(&timer(now), &mut store, &chain, 100).unwrap();
    assert_eq!(stale, TickOutcome::Skipped(SkipReason::RetriedTooManyTimes { tick: 100, now }));
    assert_eq!(store, before);

    let on_time = election.on_timer(&timer(now), &mut store, &chain, now - 1).unwrap();
    assert!(on_time.committed().unwrap().genesis_completed);
}

#[test]
fn scenario_foreign_invocation_is_rejected() {
    let p = params(2, 4);
    let (mut store, chain, mut election) = deployed(&p, 30);

    let ctx = timer(100).with_source(Address::from("T80000someone"));
    let result = election.on_timer(&ctx, &mut store, &chain, 100);
    assert!(matches!(result, Err(ContractError::Unauthorized { .. })));

    let wrong = InvocationContext::timer(Address::from("sys.zec.other"), 100, vec![1]);
    let result = election.on_timer(&wrong, &mut store, &chain, 100);
    assert!(matches!(result, Err(ContractError::WrongContract { .. })));
}

#[test]
fn scenario_retained_members_keep_joined_version() {
    let p = GovernanceParams {
        auditor_group_count: 1,
        validator_group_count: 1,
        min_auditor_group_size: 2,
        max_auditor_group_size: 2,
        min_validator_group_size: 2,
        max_validator_group_size: 2,
        ..GovernanceParams::default()
    };
    // exactly enough nodes: every rotation re-elects the same members
    let (mut store, chain, mut election) = deployed(&p, 4);

    election.on_timer(&timer(10), &mut store, &chain, 10).unwrap();
    let later = 10 + p.cluster_election_interval * 2;
    let report = election.on_timer(&timer(later), &mut store, &chain, later).unwrap();
    assert_eq!(report.committed().unwrap().rotated_groups(), vec![GroupId(1)]);

    let stores = election.load_stores(&store).unwrap();
    let validator = stores[&GroupId(1)]
        .group(NET, NodeType::ConsensusValidator, DEFAULT_CLUSTER_ID, GroupId::validator(0))
        .unwrap();
    assert_eq!(validator.group_version, Some(1));
    assert!(validator.nodes().values().all(|n| n.joined_version == 0));
}
