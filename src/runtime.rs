//! Single-node runtime
//!
//! Produces beacon timer blocks, routes the dispatcher's calls into the
//! system contracts and runs every invocation against a staged overlay so a
//! failed call leaves the store untouched.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use crate::chain::{Block, ChainWriter};
use crate::config::{GovernanceParams, SeedNodeConfig};
use crate::context::{InvocationContext, SeedUnavailable, TickOutcome};
use crate::crypto::PublicKey;
use crate::dispatch::{
    BroadcastPolicy, CallWay, ChainEvent, ContractCall, ContractInfo, DispatchError, GroupBroadcaster,
    RoleContext, RoleDriver, TransactionSubmitter,
};
use crate::election::{
    ElectConsensusContract, ElectionReport, GroupAssocContract, StaticConsensusBootstrap, ELECTION_EXECUTED_KEY,
};
use crate::error::ContractError;
use crate::standby::{
    record_standby_height, register_node, RegistrationRecord, RoleType, StandbyPoolContract,
};
use crate::storage::{PropertyStore, StagedStore, StorageError};
use crate::types::{
    Address, LogicTime, NetworkId, NodeId, NodeType, NodeTypeSet, BEACON_TIMER_ADDR, REC_STANDBY_POOL_ADDR,
    ZEC_ELECT_CONSENSUS_ADDR, ZEC_GROUP_ASSOC_ADDR, ZEC_STANDBY_POOL_ADDR,
};

/// Timer rounds between standby pool reconciliations
pub const STANDBY_TIMER_INTERVAL: u64 = 3;

/// Accounts that get a genesis block at setup
const SYSTEM_CONTRACTS: [&str; 4] = [
    REC_STANDBY_POOL_ADDR,
    ZEC_STANDBY_POOL_ADDR,
    ZEC_GROUP_ASSOC_ADDR,
    ZEC_ELECT_CONSENSUS_ADDR,
];

pub const ON_TIMER_ACTION: &str = "on_timer";
pub const ON_STANDBY_BLOCK_ACTION: &str = "on_standby_block";

/// Run `invoke` against a staged overlay of `store` and commit its writes
/// only if it returns `Ok`.
pub fn execute<S, T, F>(store: &mut S, invoke: F) -> Result<T, ContractError>
where
    S: PropertyStore + ?Sized,
    F: FnOnce(&mut StagedStore<'_, S>) -> Result<T, ContractError>,
{
    let mut staged = StagedStore::new(store);
    let value = invoke(&mut staged)?;
    let written = staged.commit()?;
    debug!(written, "Invocation committed");
    Ok(value)
}

/// Calls handed over by the dispatcher, executed in arrival order
#[derive(Debug, Default)]
pub struct CallQueue {
    pending: VecDeque<ContractCall>,
}

impl CallQueue {
    pub fn pop(&mut self) -> Option<ContractCall> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl TransactionSubmitter for CallQueue {
    // a single node is its own consensus
    fn request_transaction_consensus(&mut self, call: ContractCall) -> Result<(), DispatchError> {
        self.pending.push_back(call);
        Ok(())
    }

    fn execute_direct(&mut self, call: ContractCall) -> Result<(), DispatchError> {
        self.pending.push_back(call);
        Ok(())
    }
}

/// Network position of a single node: leader slot 0 serving every table
#[derive(Debug, Default)]
pub struct LocalDriver {
    table_ids: Vec<u16>,
    broadcasts: u64,
}

impl LocalDriver {
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts
    }
}

impl GroupBroadcaster for LocalDriver {
    fn send_to_group(&mut self, types: NodeTypeSet, payload: Vec<u8>) {
        self.broadcasts += 1;
        debug!(?types, bytes = payload.len(), "Broadcast");
    }
}

impl RoleDriver for LocalDriver {
    fn slot_id(&self) -> u16 {
        0
    }

    fn table_ids(&self) -> Vec<u16> {
        self.table_ids.clone()
    }
}

/// What one executed call produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Standby(TickOutcome<bool>),
    Election(TickOutcome<ElectionReport>),
    StandbyHeight(bool),
}

/// Summary of one timer tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub round: u64,
    pub executed: usize,
    pub failed: usize,
    /// Election outcomes of this tick, in execution order
    pub elections: Vec<TickOutcome<ElectionReport>>,
}

pub struct NodeRuntime<S, C> {
    network_id: NetworkId,
    store: S,
    chain: C,
    standby: StandbyPoolContract,
    association: GroupAssocContract,
    election: ElectConsensusContract,
    contexts: Vec<RoleContext>,
    driver: LocalDriver,
    queue: CallQueue,
}

impl<S, C> NodeRuntime<S, C>
where
    S: PropertyStore,
    C: ChainWriter,
{
    pub fn new(network_id: NetworkId, params: GovernanceParams, store: S, chain: C) -> Self {
        let beacon = Address::from(BEACON_TIMER_ADDR);
        let contexts = vec![
            RoleContext::new(
                ContractInfo::new(Address::from(REC_STANDBY_POOL_ADDR))
                    .with_timer(beacon.clone(), STANDBY_TIMER_INTERVAL, ON_TIMER_ACTION, CallWay::Consensus)
                    .with_broadcast(
                        BroadcastPolicy::Normal,
                        NodeTypeSet::empty().with(NodeType::Zec).with(NodeType::Archive),
                    ),
            ),
            RoleContext::new(ContractInfo::new(Address::from(ZEC_STANDBY_POOL_ADDR)).with_block_monitor(
                Address::from(REC_STANDBY_POOL_ADDR),
                ON_STANDBY_BLOCK_ACTION,
                CallWay::Direct,
            )),
            RoleContext::new(ContractInfo::new(Address::from(ZEC_ELECT_CONSENSUS_ADDR)).with_timer(
                beacon,
                params.zone_election_trigger_interval,
                ON_TIMER_ACTION,
                CallWay::Consensus,
            )),
        ];

        Self {
            network_id,
            store,
            chain,
            standby: StandbyPoolContract::new(network_id),
            association: GroupAssocContract::new(),
            election: ElectConsensusContract::new(network_id, params),
            contexts,
            driver: LocalDriver::default(),
            queue: CallQueue::default(),
        }
    }

    pub fn with_static_bootstrap(mut self, bootstrap: StaticConsensusBootstrap) -> Self {
        self.election = self.election.with_static_bootstrap(bootstrap);
        self
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn params(&self) -> &GovernanceParams {
        self.election.params()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn election(&self) -> &ElectConsensusContract {
        &self.election
    }

    pub fn standby(&self) -> &StandbyPoolContract {
        &self.standby
    }

    pub fn driver(&self) -> &LocalDriver {
        &self.driver
    }

    /// One-time setup of every system contract: properties, genesis blocks,
    /// then the first standby snapshot at height 1.
    pub fn setup(&mut self, seeds: &[SeedNodeConfig]) -> Result<(), ContractError> {
        let network_id = self.network_id;
        let standby = &self.standby;
        let association = &self.association;
        let election = &self.election;
        execute(&mut self.store, |store| {
            standby.setup(store, seeds)?;
            for seed in seeds {
                let node_id = NodeId::new(seed.node_id.clone());
                let record = seed_registration(network_id, seed)?;
                register_node(store, &node_id, &record)?;
            }
            association.setup(store, election.params())?;
            election.setup(store)
        })?;
        for address in SYSTEM_CONTRACTS {
            self.chain.commit_genesis(&Address::from(address), 0)?;
        }
        info!(seeds = seeds.len(), network = network_id.0, "System contracts set up");

        self.publish_standby(0)?;
        self.drain(0);
        Ok(())
    }

    /// Register a candidate and add it to the standby pool.
    ///
    /// Returns whether the pool changed; a changed pool is published.
    pub fn register_candidate(
        &mut self,
        node_id: &NodeId,
        record: &RegistrationRecord,
        program_version: &str,
    ) -> Result<bool, ContractError> {
        let standby = &self.standby;
        let changed = execute(&mut self.store, |store| {
            register_node(store, node_id, record)?;
            standby.node_join_network(store, node_id, program_version)
        })?;
        if changed {
            let now = self.logic_time()?;
            self.publish_standby(now)?;
            self.drain(0);
        }
        Ok(changed)
    }

    /// Logical time of the latest beacon timer block
    pub fn logic_time(&self) -> Result<LogicTime, StorageError> {
        let beacon = Address::from(BEACON_TIMER_ADDR);
        let height = self.chain.latest_height(&beacon)?;
        Ok(self
            .chain
            .get_block_by_height(&beacon, height)?
            .map(|b| b.timestamp())
            .unwrap_or(0))
    }

    /// Produce the next beacon timer block and run everything it triggers
    pub fn tick(&mut self, wall_clock_ms: u64) -> Result<TickReport, StorageError> {
        let beacon = Address::from(BEACON_TIMER_ADDR);
        let latest = self.chain.latest_height(&beacon)?;
        let round = match self.chain.get_block_by_height(&beacon, latest)? {
            Some(_) => latest + 1,
            None => 0,
        };
        // one logical time unit per round
        self.chain.commit_snapshot(&beacon, round, BTreeMap::new())?;
        let block = self
            .chain
            .get_block_by_height(&beacon, round)?
            .ok_or(StorageError::BlockMissing { owner: beacon, height: round })?;

        self.dispatch(&ChainEvent::Timer(block));
        let mut report = self.drain(wall_clock_ms);
        report.round = round;
        Ok(report)
    }

    fn dispatch(&mut self, event: &ChainEvent) -> usize {
        let mut broadcasted = false;
        let mut calls = 0;
        for context in self.contexts.iter_mut() {
            calls += context.on_block(event, &mut broadcasted, &mut self.driver, &mut self.queue, &self.chain);
        }
        calls
    }

    fn drain(&mut self, wall_clock_ms: u64) -> TickReport {
        let mut report = TickReport::default();
        while let Some(call) = self.queue.pop() {
            let target = call.target.clone();
            match self.execute_call(call, wall_clock_ms) {
                Ok(outcome) => {
                    report.executed += 1;
                    if let CallOutcome::Election(election) = outcome {
                        report.elections.push(election);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(contract = %target, error = %e, "Contract call failed");
                }
            }
        }
        report
    }

    /// Execute one dispatched call
    pub fn execute_call(&mut self, call: ContractCall, wall_clock_ms: u64) -> Result<CallOutcome, DispatchError> {
        match (call.target.base(), call.action.as_str()) {
            (REC_STANDBY_POOL_ADDR, ON_TIMER_ACTION) => {
                let ctx = self.timer_context(&call, wall_clock_ms)?;
                let standby = &self.standby;
                let outcome = execute(&mut self.store, |store| standby.on_timer(&ctx, store, call.fire_timestamp))?;
                if outcome == TickOutcome::Committed(true) {
                    self.publish_standby(call.fire_timestamp)?;
                }
                Ok(CallOutcome::Standby(outcome))
            }
            (ZEC_ELECT_CONSENSUS_ADDR, ON_TIMER_ACTION) => {
                let ctx = self.timer_context(&call, wall_clock_ms)?;
                let election = &mut self.election;
                let chain = &self.chain;
                let outcome = execute(&mut self.store, |store| {
                    election.on_timer(&ctx, store, chain, call.fire_timestamp)
                })?;
                if outcome.is_committed() {
                    self.commit_election_block(call.fire_timestamp)?;
                }
                Ok(CallOutcome::Election(outcome))
            }
            (ZEC_STANDBY_POOL_ADDR, ON_STANDBY_BLOCK_ACTION) => {
                let height = call.round;
                let changed = execute(&mut self.store, |store| {
                    record_standby_height(store, height).map_err(ContractError::from)
                })?;
                Ok(CallOutcome::StandbyHeight(changed))
            }
            _ => Err(DispatchError::UnknownContract(call.target)),
        }
    }

    fn timer_context(&self, call: &ContractCall, wall_clock_ms: u64) -> Result<InvocationContext, StorageError> {
        let seed = self
            .chain
            .get_block_by_height(&Address::from(BEACON_TIMER_ADDR), call.round)?
            .map(|block| block.hash().as_bytes().to_vec())
            .ok_or_else(|| SeedUnavailable(format!("no timer block at round {}", call.round)));
        Ok(InvocationContext {
            self_address: call.target.clone(),
            source_address: call.target.clone(),
            consensus_time: self.logic_time()?,
            seed,
            wall_clock_ms,
        })
    }

    /// Publish the standby store and let the dispatcher see the new block
    fn publish_standby(&mut self, timestamp: LogicTime) -> Result<u64, StorageError> {
        let height = self.standby.publish_snapshot(&self.store, &mut self.chain, timestamp)?;
        let owner = self.standby.address().clone();
        let block = self
            .chain
            .get_block_by_height(&owner, height)?
            .ok_or(StorageError::BlockMissing { owner, height })?;
        debug!(height, "Standby snapshot published");
        self.dispatch(&ChainEvent::BlockToDb { block, new_block: true });
        Ok(height)
    }

    fn commit_election_block(&mut self, timestamp: LogicTime) -> Result<Block, StorageError> {
        let address = self.election.address().clone();
        let mut properties = BTreeMap::new();
        if let Some(flag) = self.store.string_get(&address, ELECTION_EXECUTED_KEY)? {
            properties.insert(ELECTION_EXECUTED_KEY.to_string(), flag);
        }
        let height = self.chain.commit_snapshot(&address, timestamp, properties)?;
        let block = self
            .chain
            .get_block_by_height(&address, height)?
            .ok_or(StorageError::BlockMissing { owner: address, height })?;
        self.dispatch(&ChainEvent::BlockToDb {
            block: block.clone(),
            new_block: true,
        });
        Ok(block)
    }
}

fn seed_registration(network_id: NetworkId, seed: &SeedNodeConfig) -> Result<RegistrationRecord, ContractError> {
    let consensus_public_key = PublicKey::from_hex(&seed.public_key).map_err(|e| ContractError::InvalidRegistration {
        node: NodeId::new(seed.node_id.clone()),
        reason: e.to_string(),
    })?;
    Ok(RegistrationRecord {
        role: RoleType::Advance,
        consensus_public_key,
        network_ids: [network_id].into_iter().collect(),
        stakes: NodeType::ALL.iter().map(|t| (*t, seed.stake)).collect(),
        account_mortgage: 0,
        required_min_deposit: 0,
        is_genesis_node: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainReader, MemoryChain};
    use crate::config::SelectionPolicy;
    use crate::crypto::ConsensusKeypair;
    use crate::election::{GenesisBootstrap, GenesisStage};
    use crate::storage::MemoryStore;
    use crate::types::{ClusterId, GroupId, DEFAULT_CLUSTER_ID};

    const NET: NetworkId = NetworkId(255);

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

    fn seeds(count: u8) -> Vec<SeedNodeConfig> {
        (0..count)
            .map(|i| {
                let key = ConsensusKeypair::from_secret(&[i + 1; 32]).unwrap().public_key();
                SeedNodeConfig {
                    node_id: key.node_id().0,
                    public_key: key.to_hex(),
                    stake: 1 + i as u64,
                }
            })
            .collect()
    }

    fn runtime() -> NodeRuntime<MemoryStore, MemoryChain> {
        NodeRuntime::new(NET, params(), MemoryStore::new(), MemoryChain::new())
    }

    fn group_size(rt: &NodeRuntime<MemoryStore, MemoryChain>, t: NodeType, cluster: ClusterId, gid: GroupId) -> usize {
        let stores = rt.election().load_stores(rt.store()).unwrap();
        stores
            .values()
            .filter_map(|s| s.group(NET, t, cluster, gid))
            .map(|g| g.len())
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_execute_discards_failed_invocation() {
        let mut store = MemoryStore::new();
        let account = Address::from("sys.test");
        let result: Result<(), ContractError> = execute(&mut store, |s| {
            s.string_set(&account, "a", vec![1])?;
            Err(ContractError::RegistrationUnavailable)
        });
        assert!(result.is_err());
        assert_eq!(store.string_get(&account, "a").unwrap(), None);

        execute(&mut store, |s| Ok(s.string_set(&account, "a", vec![2])?)).unwrap();
        assert_eq!(store.string_get(&account, "a").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_setup_publishes_and_records_standby_snapshot() {
        let mut rt = runtime();
        rt.setup(&seeds(4)).unwrap();

        let pool = Address::from(REC_STANDBY_POOL_ADDR);
        assert!(rt.chain().get_block_by_height(&pool, 0).unwrap().unwrap().is_genesis());
        assert!(rt.chain().get_block_by_height(&pool, 1).unwrap().is_some());
        for address in [ZEC_STANDBY_POOL_ADDR, ZEC_GROUP_ASSOC_ADDR, ZEC_ELECT_CONSENSUS_ADDR] {
            let address = Address::from(address);
            assert_eq!(rt.chain().latest_height(&address).unwrap(), 0);
            assert!(rt.chain().get_block_by_height(&address, 0).unwrap().is_some());
        }
        let recorded = rt
            .store()
            .string_get(&Address::from(ZEC_STANDBY_POOL_ADDR), crate::standby::LAST_READ_REC_STANDBY_HEIGHT_KEY)
            .unwrap();
        assert_eq!(recorded, Some(b"1".to_vec()));
        // the standby pool broadcasts its own blocks from slot 0
        assert_eq!(rt.driver().broadcasts(), 2);
    }

    #[test]
    fn test_first_election_runs_on_stand_alone_round() {
        let mut rt = runtime();
        rt.setup(&seeds(24)).unwrap();

        for expected_round in 0..3 {
            let report = rt.tick(0).unwrap();
            assert_eq!(report.round, expected_round);
            assert!(report.elections.is_empty());
        }

        let report = rt.tick(0).unwrap();
        assert_eq!(report.round, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.elections.len(), 1);
        let election = report.elections[0].clone().committed().unwrap();
        assert!(election.genesis_completed);
        assert_eq!(election.rotated.len(), 2);

        let genesis = GenesisBootstrap::load(rt.store(), rt.election().address()).unwrap();
        assert_eq!(genesis.stage(), GenesisStage::Completed);
        for index in 0..4 {
            let size = group_size(&rt, NodeType::ConsensusValidator, DEFAULT_CLUSTER_ID, GroupId::validator(index));
            assert!((2..=3).contains(&size));
        }
        assert_eq!(rt.chain().latest_height(rt.election().address()).unwrap(), 1);
    }

    #[test]
    fn test_unknown_call_is_rejected() {
        let mut rt = runtime();
        let call = ContractCall::timer(Address::from("sys.nowhere"), ON_TIMER_ACTION, 1, 1);
        assert!(matches!(
            rt.execute_call(call, 0),
            Err(DispatchError::UnknownContract(_))
        ));
    }

    #[test]
    fn test_registering_candidate_publishes_new_snapshot() {
        let mut rt = runtime();
        rt.setup(&seeds(2)).unwrap();

        let key = ConsensusKeypair::from_secret(&[99; 32]).unwrap().public_key();
        let record = RegistrationRecord {
            role: RoleType::Advance,
            consensus_public_key: key.clone(),
            network_ids: [NET].into_iter().collect(),
            stakes: NodeType::ALL.iter().map(|t| (*t, 10)).collect(),
            account_mortgage: 10,
            required_min_deposit: 1,
            is_genesis_node: false,
        };
        assert!(rt.register_candidate(&key.node_id(), &record, "1.1.0").unwrap());
        let pool = Address::from(REC_STANDBY_POOL_ADDR);
        assert_eq!(rt.chain().latest_height(&pool).unwrap(), 2);
        assert_eq!(rt.standby().load(rt.store()).unwrap().network(NET).unwrap().len(), 3);
    }

    #[test]
    fn test_election_waits_for_interval_after_first_block() {
        let mut rt = runtime();
        rt.setup(&seeds(24)).unwrap();
        let interval = rt.params().zone_election_trigger_interval;

        let mut fired = Vec::new();
        for _ in 0..=2 * interval {
            let report = rt.tick(0).unwrap();
            if !report.elections.is_empty() {
                fired.push(report.round);
            }
        }
        assert_eq!(fired, vec![3, interval, 2 * interval]);
    }

    #[test]
    fn test_static_layout_survives_restart() {
        let layout = ["auditor", "validator", "validator", "auditor", "validator", "validator"]
            .iter()
            .enumerate()
            .map(|(i, role)| {
                let key = ConsensusKeypair::from_secret(&[i as u8 + 50; 32]).unwrap().public_key();
                format!("{}:{}.10.{}", role, key.node_id().0, key.to_hex())
            })
            .collect::<Vec<_>>()
            .join("|");
        let config = crate::config::StaticConsensusConfig { layout, warmup_ms: 0 };
        let auditor_version = |rt: &NodeRuntime<MemoryStore, MemoryChain>| {
            let stores = rt.election().load_stores(rt.store()).unwrap();
            stores[&GroupId::auditor(0)]
                .group(NET, NodeType::ConsensusAuditor, DEFAULT_CLUSTER_ID, GroupId::auditor(0))
                .and_then(|g| g.group_version)
        };

        let mut rt = runtime().with_static_bootstrap(StaticConsensusBootstrap::new(&config, 0).unwrap());
        rt.setup(&seeds(4)).unwrap();
        for _ in 0..4 {
            rt.tick(0).unwrap();
        }
        assert_eq!(auditor_version(&rt), Some(0));
        assert_eq!(rt.chain().latest_height(rt.election().address()).unwrap(), 1);

        let mut restarted = NodeRuntime::new(NET, params(), rt.store().clone(), rt.chain().clone())
            .with_static_bootstrap(StaticConsensusBootstrap::new(&config, 0).unwrap());
        let interval = params().zone_election_trigger_interval;
        let mut fired = 0;
        while restarted.logic_time().unwrap() < interval {
            fired += restarted.tick(0).unwrap().elections.len();
        }
        assert_eq!(fired, 1);
        assert_eq!(auditor_version(&restarted), Some(0));
        assert_eq!(restarted.chain().latest_height(restarted.election().address()).unwrap(), 1);
    }
}
